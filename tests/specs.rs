//! Workspace scenario specs.
//!
//! Drive the daemon library end-to-end through the concrete supervisor
//! scenarios: configuration sources on a real (temporary) filesystem,
//! the lifecycle engine on fake process and clock adapters.

mod specs {
    mod prelude;

    mod lifecycle;
    mod overrides;
    mod reloads;
    mod shadowing;
}
