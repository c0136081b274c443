//! Integration test crate for ProEdit Studio.
//!
//! This crate exists solely to hold cross-module tests of the timeline
//! model: whole editing scenarios, randomized request sequences, concurrent
//! access and native resource accounting.

#[cfg(test)]
mod fixture;

#[cfg(test)]
mod timeline;

#[cfg(test)]
mod properties;

#[cfg(test)]
mod concurrency;

#[cfg(test)]
mod resources;
