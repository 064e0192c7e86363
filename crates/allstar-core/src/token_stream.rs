pub trait TokenStream {
    fn index(&self) -> usize;
    /// Symbol `i` positions ahead, 1-based; `EOF` past the end.
    fn la(&self, i: usize) -> i32;
    fn consume(&mut self);
    fn seek(&mut self, index: usize);
    fn mark(&mut self) -> usize;
    fn release(&mut self, marker: usize);
    fn size(&self) -> usize;
    /// Symbol at an absolute index; `EOF` past the end.
    fn get(&self, index: usize) -> i32;
}
