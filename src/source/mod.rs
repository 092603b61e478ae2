// Sprite source abstraction — pluggable backends for HTTP and local files.

pub mod fs_source;
pub mod http_source;
pub mod traits;
