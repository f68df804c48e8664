pub mod path;
pub mod resolver;

pub use path::{
    file_name, file_stem, join, normalize, os_path_to_string, parent_dir, string_to_os_path,
    strip_fragment,
};
pub use resolver::{CachingResolver, FilesystemResolver, InMemoryResolver, NodeReferenceResolver};
