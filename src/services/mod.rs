pub mod reporting_api;
