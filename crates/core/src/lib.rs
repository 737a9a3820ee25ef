//! A recursive, multi-threaded web retriever: crawls from a set of seed
//! URLs, following links (and, optionally, page requisites) within the
//! configured scope, saving each response to disk. See [`crawler::Retriever`]
//! for the entry point; `main.rs` only ever touches that one type.

pub mod config;
pub mod crawler;
pub mod dated_url;
pub mod error;
pub mod fingerprint;
pub mod parsers;
pub mod stats;
pub mod url_ext;
