use std::io;

use crate::sandbox::SOURCE_FILE_NAME;

/// Pack the submitted source as the only entry of an in-memory tar archive.
///
/// The entry name is always [`SOURCE_FILE_NAME`], so nothing the caller sends
/// can influence where the file lands inside the container.
pub fn source_archive(source: &str) -> io::Result<Vec<u8>> {
    let data = source.as_bytes();

    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, SOURCE_FILE_NAME, data)?;
    builder.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    #[test]
    fn test_archive_holds_single_fixed_entry() {
        let source = "def f(x: int) -> str:\n    return x\n";
        let bytes = source_archive(source).unwrap();

        let mut archive = tar::Archive::new(Cursor::new(bytes));
        let mut entries = archive.entries().unwrap();

        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_str(), Some(SOURCE_FILE_NAME));
        assert_eq!(entry.header().mode().unwrap(), 0o644);
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, source);
        drop(entry);

        assert!(entries.next().is_none());
    }

    #[test]
    fn test_archive_of_non_ascii_source() {
        let source = "s: str = 'こんにちは'\n";
        let bytes = source_archive(source).unwrap();

        let mut archive = tar::Archive::new(Cursor::new(bytes));
        let entry = archive.entries().unwrap().next().unwrap().unwrap();
        assert_eq!(entry.header().size().unwrap(), source.len() as u64);
    }
}
