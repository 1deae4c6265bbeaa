//! Workspace root crate (no functionality; hosts dev-dependency hooks).
