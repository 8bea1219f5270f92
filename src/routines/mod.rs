// Routines for calibration
pub mod calibration;
// Routines for reading and shaping datasets
pub mod data;
// Routines for convergence diagnostics
pub mod diagnostics;
// Routines for chain initialization
pub mod initialization;
// Routines for logging
pub mod logger;
// Shared numerical helpers
pub mod math;
// Routines for output
pub mod output;
// Routines for predictive ensembles
pub mod prediction;
// Routines for settings
pub mod settings;
