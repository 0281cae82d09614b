//! Tar packaging for pulled images
//!
//! The output directory is archived with its contents at the tar root so
//! that `docker load` finds `manifest.json` at depth 0. Headers are
//! normalized (fixed mtime, sorted entries) so repeated pulls of the same
//! image produce byte-identical archives.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tar::{Builder, EntryType, Header};

use crate::error::Result;

/// Fixed modification time for reproducible archives
const ARCHIVE_MTIME: u64 = 0;

/// Pack the contents of `dir` into `tar_path`, entries rooted at the
/// archive top level
pub fn pack_dir(dir: &Path, tar_path: &Path) -> Result<()> {
    let mut builder = Builder::new(File::create(tar_path)?);
    append_dir(&mut builder, dir, Path::new(""))?;
    builder.finish()?;
    Ok(())
}

fn append_dir(builder: &mut Builder<File>, dir: &Path, prefix: &Path) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let name = prefix.join(entry.file_name());
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            header.set_mode(0o755);
            header.set_mtime(ARCHIVE_MTIME);
            let mut dir_name = name.clone().into_os_string();
            dir_name.push("/");
            builder.append_data(&mut header, PathBuf::from(dir_name), io::empty())?;
            append_dir(builder, &path, &name)?;
        } else if metadata.is_file() {
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_size(metadata.len());
            header.set_mode(0o644);
            header.set_mtime(ARCHIVE_MTIME);
            builder.append_data(&mut header, &name, File::open(&path)?)?;
        }
    }
    Ok(())
}
