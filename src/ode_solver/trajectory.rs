use nalgebra::DVector;
use serde::Serialize;

/// Accepted steps of a solve, in order. The first sample is the initial state with `h = 0`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Trajectory {
    xs: Vec<f64>,
    ys: Vec<DVector<f64>>,
    hs: Vec<f64>,
}

impl Trajectory {
    pub fn clear(&mut self) {
        self.xs.clear();
        self.ys.clear();
        self.hs.clear();
    }

    pub fn push(&mut self, x: f64, y: &DVector<f64>, h: f64) {
        self.xs.push(x);
        self.ys.push(y.clone());
        self.hs.push(h);
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[DVector<f64>] {
        &self.ys
    }

    /// Step size that led to each sample.
    pub fn hs(&self) -> &[f64] {
        &self.hs
    }

    /// The values of state `i` at every sample.
    pub fn component(&self, i: usize) -> Vec<f64> {
        self.ys.iter().map(|y| y[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use super::Trajectory;

    #[test]
    fn samples_are_appended_in_order() {
        let mut t = Trajectory::default();
        t.push(0.0, &DVector::from_vec(vec![1.0, 2.0]), 0.0);
        t.push(0.5, &DVector::from_vec(vec![3.0, 4.0]), 0.5);
        assert_eq!(t.len(), 2);
        assert_eq!(t.xs(), &[0.0, 0.5]);
        assert_eq!(t.hs(), &[0.0, 0.5]);
        assert_eq!(t.component(1), vec![2.0, 4.0]);
        t.clear();
        assert!(t.is_empty());
    }
}
