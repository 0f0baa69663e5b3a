// ============================================================
// Layer 6 - Metrics Logger
// ============================================================
// Records per-epoch training metrics and renders them as the
// metrics.csv artifact published next to the model.
//
// Metrics recorded per epoch:
//   - epoch:          the epoch number (1, 2, 3, ...)
//   - train_loss:     mean (class-weighted) cross-entropy on training batches
//   - train_accuracy: fraction of training samples classified correctly
//   - val_loss:       mean cross-entropy on the validation set
//   - val_accuracy:   fraction of validation samples classified correctly
//
// The validation columns are left empty when the run has no
// validation set.
//
// Example CSV output:
//   epoch,train_loss,train_accuracy,val_loss,val_accuracy
//   1,1.098200,0.333333,1.097100,0.500000
//   2,1.084500,0.611111,1.090300,0.500000
//
// How to read the metrics:
//   - Loss should decrease each epoch (model is learning)
//   - If val_loss increases while train_loss decreases → overfitting

use std::fmt::Write;

use serde::{Deserialize, Serialize};

pub const CSV_HEADER: &str = "epoch,train_loss,train_accuracy,val_loss,val_accuracy";

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Average loss over all training batches
    pub train_loss: f64,

    /// Range: [0.0, 1.0]
    pub train_accuracy: f64,

    /// None when there is no validation set
    pub val_loss: Option<f64>,

    pub val_accuracy: Option<f64>,
}

impl EpochMetrics {
    /// The loss early stopping watches: validation if present, else training.
    pub fn monitored_loss(&self) -> f64 {
        self.val_loss.unwrap_or(self.train_loss)
    }

    /// Returns true if this epoch improved over the previous best monitored loss
    pub fn is_improvement(&self, best_loss: f64) -> bool {
        self.monitored_loss() < best_loss
    }
}

/// Render `metrics` as CSV bytes, header first.
pub fn metrics_csv(metrics: &[EpochMetrics]) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(CSV_HEADER);
    out.push('\n');

    for m in metrics {
        // Writing into a String cannot fail
        let _ = write!(out, "{},{:.6},{:.6},", m.epoch, m.train_loss, m.train_accuracy);
        if let Some(loss) = m.val_loss {
            let _ = write!(out, "{loss:.6}");
        }
        out.push(',');
        if let Some(acc) = m.val_accuracy {
            let _ = write!(out, "{acc:.6}");
        }
        out.push('\n');
    }

    tracing::debug!("Rendered {} epoch rows of metrics", metrics.len());
    out.into_bytes()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn row(epoch: usize, train: f64, val: Option<f64>) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_loss: train,
            train_accuracy: 0.5,
            val_loss: val,
            val_accuracy: val.map(|_| 0.25),
        }
    }

    #[test]
    fn test_is_improvement() {
        let m = row(2, 2.5, Some(2.3));
        // 2.3 < 3.0 → this is an improvement
        assert!(m.is_improvement(3.0));
        // 2.3 is NOT less than 2.0 → not an improvement
        assert!(!m.is_improvement(2.0));
    }

    #[test]
    fn test_monitors_train_loss_without_validation() {
        let m = row(1, 0.7, None);
        assert_eq!(m.monitored_loss(), 0.7);
    }

    #[test]
    fn test_csv_rows() {
        let csv = String::from_utf8(metrics_csv(&[row(1, 1.0, Some(0.5)), row(2, 0.5, None)])).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "1,1.000000,0.500000,0.500000,0.250000");
        assert_eq!(lines[2], "2,0.500000,0.500000,,");
    }
}
