mod helpers;

mod tests_iterator;

// Priority 2 — robustness tests
mod tests_corruption;
