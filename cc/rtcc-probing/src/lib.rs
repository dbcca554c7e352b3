#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod bandwidth;
pub mod event;
pub mod probe;
pub mod time;
