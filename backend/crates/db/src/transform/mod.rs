pub mod document_repository;
pub mod models;
pub mod repositories;
