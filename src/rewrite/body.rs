//! Literal byte substitution used for bodies and header values.
//!
//! A [`SubstitutionPass`] scans its input once, left to right. At each
//! position the longest matching text decides: a rule needle is replaced, a
//! protected marker (text this mirror already produced) is copied through
//! untouched. A marker wins a tie with a needle of the same length. Re-running
//! a pass over its own output therefore changes nothing, and a needle that
//! extends a marker (`http://host:8080` over `http://host`) is still replaced.

/// One scan over a body with a fixed set of rules.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionPass {
    /// (needle, replacement), longest needle first.
    rules: Vec<(Vec<u8>, Vec<u8>)>,
    /// Already-substituted text, longest first.
    protected: Vec<Vec<u8>>,
    /// Bytes that can start a rule or a marker.
    starts: Box<[bool]>,
}

impl SubstitutionPass {
    pub fn new<R, P>(rules: R, protected: P) -> Self
    where
        R: IntoIterator<Item = (String, String)>,
        P: IntoIterator<Item = String>,
    {
        let mut rules: Vec<(Vec<u8>, Vec<u8>)> = rules
            .into_iter()
            .filter(|(needle, _)| !needle.is_empty())
            .map(|(needle, replacement)| (needle.into_bytes(), replacement.into_bytes()))
            .collect();
        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        rules.dedup_by(|a, b| a.0 == b.0);

        let mut protected: Vec<Vec<u8>> = protected
            .into_iter()
            .filter(|marker| !marker.is_empty())
            .map(String::into_bytes)
            .collect();
        protected.sort_by(|a, b| b.len().cmp(&a.len()));
        protected.dedup();

        let mut starts = vec![false; 256].into_boxed_slice();
        for first in rules
            .iter()
            .map(|(needle, _)| needle[0])
            .chain(protected.iter().map(|marker| marker[0]))
        {
            starts[first as usize] = true;
        }

        Self {
            rules,
            protected,
            starts,
        }
    }

    /// True when the pass has no rules and returns its input unchanged.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn apply(&self, input: &[u8]) -> Vec<u8> {
        if self.rules.is_empty() {
            return input.to_vec();
        }

        let mut out = Vec::with_capacity(input.len());
        let mut i = 0;
        while i < input.len() {
            if !self.starts[input[i] as usize] {
                out.push(input[i]);
                i += 1;
                continue;
            }

            let rest = &input[i..];
            let marker = self
                .protected
                .iter()
                .find(|marker| rest.starts_with(marker.as_slice()))
                .map_or(0, Vec::len);
            let rule = self
                .rules
                .iter()
                .find(|(needle, _)| needle.len() > marker && rest.starts_with(needle.as_slice()));

            if let Some((needle, replacement)) = rule {
                out.extend_from_slice(replacement);
                i += needle.len();
                continue;
            }
            if marker > 0 {
                out.extend_from_slice(&rest[..marker]);
                i += marker;
                continue;
            }

            out.push(input[i]);
            i += 1;
        }
        out
    }

    pub fn apply_str(&self, input: &str) -> String {
        if self.rules.is_empty() {
            return input.to_string();
        }
        // Needles and replacements are whole UTF-8 strings, so the output is too.
        String::from_utf8(self.apply(input.as_bytes())).unwrap_or_else(|e| {
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        })
    }
}
