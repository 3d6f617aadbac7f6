//! Page-level scenarios run against an in-memory API.

mod support;

mod dashboard_page;
