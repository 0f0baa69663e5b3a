// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one caller-visible goal (train, convert, classify, ...).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - File access only through the artifact store (Layer 6)
//   - Only workflow coordination

/// The interpret → build → fit → train → publish pipeline
pub mod train_use_case;

/// Int8 export of a published model
pub mod convert_use_case;

/// Top-k labels for a query
pub mod classify_use_case;

/// status, export, clear and check
pub mod artifacts_use_case;
