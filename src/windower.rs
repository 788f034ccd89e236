use ndarray::{s, Array2};

/// One fixed-length run of input rows. Owns a copy of its slice, never a
/// view, so later mutation of the source cannot corrupt a built window.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceWindow {
    start: usize,
    data: Array2<f64>,
}

impl SequenceWindow {
    /// Index of the first source row covered by this window.
    pub fn start(&self) -> usize {
        self.start
    }

    /// `n_steps x n_columns` window contents.
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }
}

/// Builds fixed-length sliding windows for recurrent forecasting. Pure
/// function of its input: same rows in, same windows out.
#[derive(Debug, Clone, Copy)]
pub struct SequenceWindower {
    n_steps: usize,
}

impl SequenceWindower {
    pub fn new(n_steps: usize) -> Self {
        Self { n_steps }
    }

    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    /// Window `i` covers rows `[i, i + n_steps)`, for `i` in
    /// `0..L - n_steps`. With `L <= n_steps` there is not enough history
    /// and the result is empty; callers treat that as a skip, not an error.
    pub fn windows(&self, rows: &Array2<f64>) -> Vec<SequenceWindow> {
        let len = rows.nrows();
        if len <= self.n_steps {
            return Vec::new();
        }

        (0..len - self.n_steps)
            .map(|i| SequenceWindow {
                start: i,
                data: rows.slice(s![i..i + self.n_steps, ..]).to_owned(),
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    fn rows() -> Array2<f64> {
        array![[0.0], [1.0], [2.0], [3.0], [4.0]]
    }

    #[test]
    fn five_rows_two_steps_yield_three_windows() {
        let windows = SequenceWindower::new(2).windows(&rows());
        assert_eq!(windows.len(), 3);

        assert_eq!(windows[0].start(), 0);
        assert_eq!(windows[0].data(), &array![[0.0], [1.0]]);
        assert_eq!(windows[1].data(), &array![[1.0], [2.0]]);
        assert_eq!(windows[2].start(), 2);
        assert_eq!(windows[2].data(), &array![[2.0], [3.0]]);
    }

    #[test]
    fn insufficient_history_is_empty_not_an_error() {
        assert!(SequenceWindower::new(5).windows(&rows()).is_empty());
        assert!(SequenceWindower::new(7).windows(&rows()).is_empty());
    }

    #[test]
    fn windows_own_their_data() {
        let mut source = rows();
        let windows = SequenceWindower::new(2).windows(&source);
        source[(0, 0)] = 99.0;
        assert_eq!(windows[0].data(), &array![[0.0], [1.0]]);
    }

    #[test]
    fn deterministic_for_identical_input() {
        let windower = SequenceWindower::new(3);
        assert_eq!(windower.windows(&rows()), windower.windows(&rows()));
    }
}
