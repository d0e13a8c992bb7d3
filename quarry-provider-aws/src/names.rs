//! Service display names used in error messages

pub const LAKE_FORMATION: &str = "Lake Formation";
pub const RDS: &str = "RDS";
