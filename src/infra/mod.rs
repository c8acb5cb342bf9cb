pub mod catalog;
pub mod db;
pub mod memory;
pub mod paths;
pub mod storage;
