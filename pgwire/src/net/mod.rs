//! Transport-level socket abstraction.
mod socket;

pub use socket::Socket;

use crate::io::WriteAllBuf;

/// Helper to drive [`WriteAllBuf`] over any buffer implementing [`bytes::Buf`].
pub trait WriteAllBufExt {
    fn write_all_buf<'a, B: bytes::Buf>(&'a mut self, buf: &'a mut B) -> WriteAllBuf<'a, Self, B>
    where
        Self: Sized;
}

impl<W> WriteAllBufExt for W {
    fn write_all_buf<'a, B: bytes::Buf>(&'a mut self, buf: &'a mut B) -> WriteAllBuf<'a, Self, B>
    where
        Self: Sized,
    {
        WriteAllBuf::new(self, buf)
    }
}
