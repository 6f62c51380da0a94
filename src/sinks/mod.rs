//! Concrete `Sink` implementations bundled with this crate. Everything
//! outside this module only depends on the [`crate::sink::Sink`] trait.

pub mod collecting;
