pub mod name;
pub mod path;
pub mod path_type;

pub use name::{case_fold_ascii, case_fold_unicode, nfc, Normalizer, VfsName};
pub use path::{VfsPath, VfsPathBuf};
pub use path_type::{parse_with, PathType, UnixPathType, WindowsPathType};
