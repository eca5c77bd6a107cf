// src/middleware.rs

pub mod action;
pub mod i18n;
