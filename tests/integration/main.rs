//! Integration tests: the full cycle against deterministic mock venues.

mod mock_venue;
mod multi_venue;
mod scenarios;
