// Header sniffing — image format detection and dimension probing.

pub mod format;
