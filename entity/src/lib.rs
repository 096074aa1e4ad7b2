//! # Entity 模块
//!
//! 包含所有 Sea-ORM 实体定义

pub mod integrations;

pub use integrations::Entity as Integrations;

#[cfg(test)]
mod tests;
