pub mod bar;
pub mod period;
