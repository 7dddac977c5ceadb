// Data models for the Smartflo wire format and stored records

pub mod records;
pub mod smartflo;
