mod breaker;
mod config;
mod mapreduce;
mod resource;
mod shedder;
mod timing_wheel;
