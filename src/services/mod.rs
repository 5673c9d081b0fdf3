pub mod failures_service;
