pub mod assets;
pub mod health;
pub mod scan_results;
pub mod subscribe;
