use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;
use crate::model::OutputFile;

/// Bundles the outputs into a deflated ZIP archive, one entry per output in
/// the given order.
pub fn build_archive(outputs: &[OutputFile]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

    for output in outputs {
        zip.start_file(output.file_name.clone(), options)?;
        zip.write_all(&output.contents)?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Writes every output as an individual file under `dir`, creating it when
/// needed.
pub fn write_results_dir(dir: &Path, outputs: &[OutputFile]) -> Result<()> {
    fs::create_dir_all(dir)?;
    for output in outputs {
        fs::write(dir.join(&output.file_name), &output.contents)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    #[test]
    fn archive_lists_entries_in_order() {
        let outputs = vec![
            OutputFile::csv("B_SHEET", b"x\n1\n".to_vec()),
            OutputFile::csv("A_SHEET", b"y\n2\n".to_vec()),
        ];

        let bytes = build_archive(&outputs).expect("archive built");
        let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("archive readable");

        assert_eq!(archive.len(), 2);
        let first_name = archive.by_index(0).expect("first entry").name().to_string();
        assert_eq!(first_name, "B_SHEET.csv");

        let mut contents = String::new();
        archive
            .by_name("A_SHEET.csv")
            .expect("entry present")
            .read_to_string(&mut contents)
            .expect("entry read");
        assert_eq!(contents, "y\n2\n");
    }
}
