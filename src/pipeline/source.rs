use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Kind of object the host enumerated, as recorded by the file-system layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// Regular file-system entry.
    #[default]
    Normal,
    Carved,
    Derived,
    Local,
    Slack,
    /// Pseudo-file spanning unallocated space.
    UnallocatedBlocks,
    /// Pseudo-file spanning unused space.
    UnusedBlocks,
    VirtualDirectory,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Carved => "carved",
            Self::Derived => "derived",
            Self::Local => "local",
            Self::Slack => "slack",
            Self::UnallocatedBlocks => "unallocated_blocks",
            Self::UnusedBlocks => "unused_blocks",
            Self::VirtualDirectory => "virtual_directory",
        }
    }

    /// Block-range pseudo-files never carry a decodable image.
    pub fn is_block_range(&self) -> bool {
        matches!(self, Self::UnallocatedBlocks | Self::UnusedBlocks)
    }
}

/// A file handed to the pipeline by the host.
///
/// Owned by the host; the pipeline borrows it for the duration of one
/// `process` call and never keeps it.
pub trait SourceFile {
    /// Host-assigned identity, used to tag results.
    fn id(&self) -> u64;

    fn name(&self) -> &str;

    fn is_regular_file(&self) -> bool;

    fn file_type(&self) -> FileType;

    /// Open a fresh reader over the file content.
    fn open(&self) -> std::io::Result<Box<dyn Read + '_>>;
}

/// A file on the local file system.
#[derive(Debug, Clone)]
pub struct LocalFile {
    id: u64,
    path: PathBuf,
    name: String,
    is_regular: bool,
}

impl LocalFile {
    /// Describe `path` without opening it. Symlinks are not followed, so a
    /// link to an image counts as non-regular.
    pub fn new(id: u64, path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let metadata = std::fs::symlink_metadata(&path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            id,
            name,
            is_regular: metadata.file_type().is_file(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceFile for LocalFile {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_regular_file(&self) -> bool {
        self.is_regular
    }

    fn file_type(&self) -> FileType {
        FileType::Local
    }

    fn open(&self) -> std::io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(std::fs::File::open(&self.path)?))
    }
}

/// In-memory file, for hosts that already hold the content.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    pub id: u64,
    pub name: String,
    pub is_regular: bool,
    pub file_type: FileType,
    pub content: Vec<u8>,
}

impl MemoryFile {
    pub fn new(id: u64, name: &str, content: &[u8]) -> Self {
        Self {
            id,
            name: name.to_string(),
            is_regular: true,
            file_type: FileType::Normal,
            content: content.to_vec(),
        }
    }

    pub fn with_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    pub fn non_regular(mut self) -> Self {
        self.is_regular = false;
        self
    }
}

impl SourceFile for MemoryFile {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_regular_file(&self) -> bool {
        self.is_regular
    }

    fn file_type(&self) -> FileType {
        self.file_type
    }

    fn open(&self) -> std::io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.content.as_slice()))
    }
}
