use crate::atn::EOF;
use crate::token_stream::TokenStream;

#[derive(Debug, Clone, Default)]
pub struct VecTokenStream {
    symbols: Vec<i32>,
    position: usize,
    open_marks: usize,
}

impl VecTokenStream {
    /// Stream over `symbols`; a trailing `EOF` is added when missing.
    pub fn new(mut symbols: Vec<i32>) -> Self {
        if symbols.last() != Some(&EOF) {
            symbols.push(EOF);
        }
        Self {
            symbols,
            position: 0,
            open_marks: 0,
        }
    }

    pub fn symbols(&self) -> &[i32] {
        &self.symbols
    }

    pub fn open_marks(&self) -> usize {
        self.open_marks
    }
}

impl TokenStream for VecTokenStream {
    fn index(&self) -> usize {
        self.position
    }

    fn la(&self, i: usize) -> i32 {
        if i == 0 {
            return 0;
        }
        self.get(self.position + i - 1)
    }

    fn consume(&mut self) {
        if self.get(self.position) != EOF {
            self.position += 1;
        }
    }

    fn seek(&mut self, index: usize) {
        self.position = index.min(self.symbols.len().saturating_sub(1));
    }

    fn mark(&mut self) -> usize {
        self.open_marks += 1;
        self.open_marks
    }

    fn release(&mut self, _marker: usize) {
        self.open_marks = self.open_marks.saturating_sub(1);
    }

    fn size(&self) -> usize {
        self.symbols.len()
    }

    fn get(&self, index: usize) -> i32 {
        self.symbols.get(index).copied().unwrap_or(EOF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_eof_and_never_consumes_past_it() {
        let mut input = VecTokenStream::new(vec![3, 4]);
        assert_eq!(input.size(), 3);
        assert_eq!(input.la(2), 4);

        input.consume();
        input.consume();
        input.consume();
        assert_eq!(input.index(), 2);
        assert_eq!(input.la(1), EOF);
        assert_eq!(input.la(5), EOF);

        input.seek(0);
        assert_eq!(input.la(1), 3);
    }
}
