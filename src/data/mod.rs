pub mod batch;

pub use batch::{LineBatch, LineBatcher, LineItem};

/// What the external data generator exposes about a dataset: the feature
/// width of its line images, the ordered symbol dictionary and whether the
/// run is a training one. The network builder only reads it.
#[derive(Debug, Clone)]
pub struct DataSource {
    pub nb_features: usize,
    pub charset: Vec<char>,
    pub training: bool,
}

impl DataSource {
    pub fn new(nb_features: usize, charset: impl IntoIterator<Item = char>, training: bool) -> Self {
        DataSource {
            nb_features,
            charset: charset.into_iter().collect(),
            training,
        }
    }

    /// Printable-ASCII dictionary, the usual default for Latin-script lines.
    pub fn with_ascii_charset(nb_features: usize, training: bool) -> Self {
        Self::new(nb_features, (32u8..=126).map(char::from), training)
    }

    pub fn vocab_size(&self) -> usize {
        self.charset.len()
    }

    /// Map decoded class indices back to text; out-of-range indices are
    /// dropped (they can only be the blank).
    pub fn decode_text(&self, classes: &[u32]) -> String {
        classes
            .iter()
            .filter_map(|&c| self.charset.get(c as usize))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_charset_size() {
        let source = DataSource::with_ascii_charset(1024, true);
        assert_eq!(source.vocab_size(), 95);
        assert_eq!(source.charset[0], ' ');
        assert_eq!(source.charset[94], '~');
    }

    #[test]
    fn decode_drops_out_of_range() {
        let source = DataSource::new(8, ['a', 'b', 'c'], false);
        assert_eq!(source.decode_text(&[0, 2, 3, 1]), "acb");
    }
}
