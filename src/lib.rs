//! Kinematic platformer character motion
//!
//! A state machine per character (ground, air, crouch, slide, roll, wall run, climb, ledge
//! grab, rope swing, swim, dash, fly) on top of a shared kinematic physics pipeline, driven by a
//! fixed-step scheduler over a rapier collision world.

pub mod config;
pub mod game;
