//! Runtime plugins shipped with the framework

pub mod coscheduling;
