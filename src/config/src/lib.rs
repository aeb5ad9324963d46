// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#[macro_use]
extern crate log;

mod db;
mod debug;
mod petrel;
mod server;
mod worker;

pub use db::{Db, DbConfig};
pub use debug::{Debug, DebugConfig};
pub use petrel::PetrelConfig;
pub use server::{Server, ServerConfig};
pub use worker::{Worker, WorkerConfig};
