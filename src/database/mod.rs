// Database module
// LanceDB-backed course catalog and lesson content indexes

pub mod lancedb;
