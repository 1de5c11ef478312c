use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

pub struct MatrixHelper;

impl MatrixHelper {
    /// Euclidean distance from `point` to every row of `rows`.
    pub fn row_distances(rows: ArrayView2<f64>, point: ArrayView1<f64>) -> Array1<f64> {
        let diff = &rows - &point.insert_axis(Axis(0));
        diff.map_axis(Axis(1), |row| row.dot(&row).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn row_distances_match_euclidean_norm() {
        let rows = array![[0.0, 0.0], [3.0, 4.0], [1.0, 0.0]];
        let point = array![0.0, 0.0];
        let distances = MatrixHelper::row_distances(rows.view(), point.view());
        assert_eq!(distances.to_vec(), vec![0.0, 5.0, 1.0]);
    }
}
