//! Classifieds domain: ads, comments and the rules around them.

pub mod access;
pub mod domain;
pub mod listing;
pub mod repository;
