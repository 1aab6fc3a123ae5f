use std::borrow::Cow;

/// Set of sorted-store columns a session works on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Selection {
    /// Every column.
    All,
    /// Strictly ascending column indices.
    Columns(Vec<usize>),
}

impl Selection {
    /// Build from arbitrary indices; sorts and removes duplicates.
    pub fn from_columns(mut columns: Vec<usize>) -> Self {
        columns.sort_unstable();
        columns.dedup();
        Selection::Columns(columns)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }

    pub fn len(&self, n_columns: usize) -> usize {
        match self {
            Selection::All => n_columns,
            Selection::Columns(c) => c.len(),
        }
    }

    pub fn is_empty(&self, n_columns: usize) -> bool {
        self.len(n_columns) == 0
    }

    pub fn columns(&self, n_columns: usize) -> Cow<'_, [usize]> {
        match self {
            Selection::All => Cow::Owned((0..n_columns).collect()),
            Selection::Columns(c) => Cow::Borrowed(c),
        }
    }

    /// Keep only explicit columns for which `keep` holds; `All` is left untouched.
    pub fn retain(&mut self, mut keep: impl FnMut(usize) -> bool) {
        if let Selection::Columns(c) = self {
            c.retain(|&col| keep(col));
        }
    }
}

/// Merge two ascending index lists into one ascending list without duplicates.
pub fn union_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let next = if a[i] < b[j] {
            i += 1;
            a[i - 1]
        } else if b[j] < a[i] {
            j += 1;
            b[j - 1]
        } else {
            i += 1;
            j += 1;
            a[i - 1]
        };
        out.push(next);
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_columns_sorts_and_dedups() {
        assert_eq!(
            Selection::from_columns(vec![5, 1, 5, 3]),
            Selection::Columns(vec![1, 3, 5])
        );
    }

    #[test]
    fn all_expands_to_every_column() {
        let sel = Selection::All;
        assert_eq!(sel.len(3), 3);
        assert_eq!(&*sel.columns(3), &[0, 1, 2]);
    }

    #[test]
    fn retain_filters_explicit_columns() {
        let mut sel = Selection::Columns(vec![0, 1, 2, 3]);
        sel.retain(|c| c % 2 == 1);
        assert_eq!(sel, Selection::Columns(vec![1, 3]));
        let mut all = Selection::All;
        all.retain(|_| false);
        assert!(all.is_all());
    }

    #[test]
    fn union_of_sorted_lists() {
        assert_eq!(union_sorted(&[1, 4, 6], &[2, 4, 9]), vec![1, 2, 4, 6, 9]);
        assert_eq!(union_sorted(&[], &[3]), vec![3]);
    }
}
