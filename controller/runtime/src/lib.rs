#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use resource_protection_core as core;

mod admission;
mod args;
mod resolve;
mod trace;

pub use self::{
    admission::{Admission, ENDPOINT},
    args::Args,
    resolve::KubeResolver,
};
