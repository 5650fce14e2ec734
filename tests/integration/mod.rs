//! Integration tests for the sift job engine
//!
//! These drive real job runs end to end against a shell-script stand-in for
//! the cracking tool, so they only build on unix.

#![cfg(unix)]

pub mod helpers;
pub mod properties;
pub mod scenarios;
