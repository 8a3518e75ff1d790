use super::source::SourceFile;
use crate::settings::Config;

/// Lower-cased, dot-prefixed extension of a file name: the text after the
/// last `.`. A name without a dot (or ending in one) has no extension.
pub fn normalized_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_lowercase()))
}

/// Decide whether the pipeline runs on `file`.
///
/// Block-range pseudo-files and non-regular entries are always skipped;
/// otherwise the extension must be one the job accepts.
pub fn is_eligible(file: &dyn SourceFile, config: &Config) -> bool {
    if file.file_type().is_block_range() || !file.is_regular_file() {
        return false;
    }

    normalized_extension(file.name()).is_some_and(|ext| config.accepts(&ext))
}
