mod alarm;
mod status;
mod suggestion;

pub mod dtos {
    pub use crate::alarm::dtos::*;
    pub use crate::suggestion::dtos::*;
}

pub use crate::alarm::api::*;
pub use crate::status::api::*;
pub use crate::suggestion::api::*;
