//! One-to-one IoU matching between two sets of rectangles.

use ndarray::Array2;

use crate::tracker::rect::{Rect, iou_batch};

/// Compute the `1 - IoU` cost matrix between two sets of boxes.
pub fn iou_distance(rows: &[Rect], cols: &[Rect]) -> Array2<f64> {
    iou_batch(rows, cols).mapv(|iou| 1.0 - iou)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_rows: Vec<usize>,
    pub unmatched_cols: Vec<usize>,
}

/// Solve the assignment problem on `cost_matrix` and keep pairs whose cost is
/// at most `thresh`.
pub fn linear_assignment(cost_matrix: &Array2<f64>, thresh: f64) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_rows: vec![],
            unmatched_cols: (0..num_cols).collect(),
        };
    }

    if num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_rows: (0..num_rows).collect(),
            unmatched_cols: vec![],
        };
    }

    // lapjv wants a square matrix
    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);
    for i in 0..num_rows {
        for j in 0..num_cols {
            padded[[i, j]] = cost_matrix[[i, j]];
        }
    }

    let mut matches = vec![];
    let mut unmatched_rows = vec![];
    let mut unmatched_cols_mask = vec![true; num_cols];

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row_idx, &col_idx) in row_to_col.iter().enumerate().take(num_rows) {
                if col_idx < num_cols && cost_matrix[[row_idx, col_idx]] <= thresh {
                    matches.push((row_idx, col_idx));
                    unmatched_cols_mask[col_idx] = false;
                } else {
                    unmatched_rows.push(row_idx);
                }
            }
        }
        Err(_) => {
            unmatched_rows = (0..num_rows).collect();
        }
    }

    let unmatched_cols = unmatched_cols_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &unmatched)| unmatched.then_some(i))
        .collect();

    AssignmentResult {
        matches,
        unmatched_rows,
        unmatched_cols,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_prefers_overlap() {
        let lost = [Rect::new(0, 0, 10, 10), Rect::new(100, 100, 120, 120)];
        let candidates = [Rect::new(101, 99, 121, 119), Rect::new(1, 1, 11, 11)];

        let cost = iou_distance(&lost, &candidates);
        let result = linear_assignment(&cost, 0.9);

        let mut matches = result.matches.clone();
        matches.sort();
        assert_eq!(matches, vec![(0, 1), (1, 0)]);
        assert!(result.unmatched_rows.is_empty());
        assert!(result.unmatched_cols.is_empty());
    }

    #[test]
    fn test_assignment_respects_threshold() {
        let lost = [Rect::new(0, 0, 10, 10)];
        let candidates = [Rect::new(9, 9, 30, 30)];

        let cost = iou_distance(&lost, &candidates);
        let result = linear_assignment(&cost, 0.9);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_rows, vec![0]);
        assert_eq!(result.unmatched_cols, vec![0]);
    }

    #[test]
    fn test_empty_inputs() {
        let cost = iou_distance(&[], &[Rect::new(0, 0, 1, 1)]);
        let result = linear_assignment(&cost, 0.5);
        assert_eq!(result.unmatched_cols, vec![0]);
    }
}
