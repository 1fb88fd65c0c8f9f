pub mod artifact_filter;
pub mod artifact_provider;
pub mod coordinates;
pub mod effective_model;
pub mod metadata_xml;
pub mod paths;
pub mod pom;
pub mod remote_repo;
