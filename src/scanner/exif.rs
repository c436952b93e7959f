use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// EXIF Orientation を読む（EXIFがない・読めない場合は None）
pub fn read_orientation(path: &Path) -> Option<u32> {
    let file = File::open(path).ok()?;
    let mut bufreader = BufReader::new(file);
    let exif_reader = exif::Reader::new();
    let exif = exif_reader.read_from_container(&mut bufreader).ok()?;

    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0).filter(|v| (1..=8).contains(v))
}
