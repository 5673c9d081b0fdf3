pub mod failures_route;
