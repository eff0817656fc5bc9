//! Reads handwritten marks off photographed paper ballots.
//!
//! A photo is registered against known ballot templates using anchor words
//! found by an external text-layout service, then every checkbox of the best
//! template is cropped from the photo and checked for a mark.

pub mod affine;
pub mod debug;
pub mod geometry;
pub mod image_utils;
pub mod keywords;
pub mod layout;
pub mod layout_provider;
pub mod marks;
pub mod recognize;
pub mod selector;
pub mod templates;
pub mod types;
pub mod validator;
