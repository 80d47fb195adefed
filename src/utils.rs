use itertools::Itertools;

pub fn numel(shape: &[i64]) -> usize {
    shape.iter().fold(1, |x, y| x * y) as usize
}

pub fn to_csv_str<T: ToString>(vals: &[T]) -> String {
    vals.iter().map(|v| v.to_string()).join(",")
}

/// Element-wise `|a - b| <= atol`. Lengths must agree; shapes are not compared
/// so a `[1, 3, 2]` output can be checked against a `[3, 2]` reference.
pub fn allclose(a: &[f32], b: &[f32], atol: f32) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip_eq(b.iter())
            .all(|(x, y)| (x - y).abs() <= atol)
}

pub fn vec_close(a: Vec<f32>, b: Vec<f32>) -> bool {
    allclose(&a, &b, 1e-5)
}
