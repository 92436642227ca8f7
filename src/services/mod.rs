pub mod orchestrator;
pub mod scanner;
pub mod staging;
pub mod upload_service;
