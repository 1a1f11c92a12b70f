//! Configuration access port trait.

/// Raw string access; parsing and validation live in the domain readers.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Items of a `sep`-separated value, trimmed, empty items dropped.
    fn get_list(&self, section: &str, key: &str, sep: char) -> Option<Vec<String>> {
        self.get_string(section, key).map(|v| {
            v.split(sep)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
    }
}
