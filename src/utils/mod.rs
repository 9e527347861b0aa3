pub mod image_validation;
pub mod multipart_utils;
