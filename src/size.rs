//! A self-documenting byte-count newtype for configuration call sites
//! (`Size::mebi(64)` reads better than a bare `usize`).

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Size(usize);

impl Size {
    pub const fn new(bytes: usize) -> Self {
        Size(bytes)
    }

    pub const fn kibi(n: usize) -> Self {
        Size(n * 1024)
    }

    pub const fn mebi(n: usize) -> Self {
        Size(n * 1024 * 1024)
    }

    pub const fn gibi(n: usize) -> Self {
        Size(n * 1024 * 1024 * 1024)
    }

    pub const fn bytes(self) -> usize {
        self.0
    }
}

impl From<usize> for Size {
    fn from(bytes: usize) -> Self {
        Size(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_convert_to_bytes() {
        assert_eq!(Size::kibi(1).bytes(), 1024);
        assert_eq!(Size::mebi(1).bytes(), 1024 * 1024);
        assert_eq!(Size::gibi(1).bytes(), 1024 * 1024 * 1024);
    }
}
