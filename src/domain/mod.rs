// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate has its own subdirectory with its value objects, events,
// commands, errors and aggregate implementation.
//
// This layer is completely separate from the event sourcing infrastructure
// and from the engine that serializes access to it.
//
// ============================================================================

pub mod order;
