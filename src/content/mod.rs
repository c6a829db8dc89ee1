// SPDX-License-Identifier: GPL-3.0-only
pub mod decode;
pub mod models;
pub mod ops;

pub use models::{Category, Collection, ContentSnapshot, Item, Order, OrderLine};
pub use ops::Upsert;
