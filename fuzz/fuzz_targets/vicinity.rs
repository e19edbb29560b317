#![no_main]

mod common;

use libfuzzer_sys::fuzz_target;
use polloc::{Sys, VicinityPool};

use crate::common::Action;

fuzz_target!(|actions: Vec<Action>| {
    let mut pool = VicinityPool::new(Sys);
    common::run(&mut pool, actions);
});
