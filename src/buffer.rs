use std::io::{self, Read};

/// Bytes read from the link that haven't been fed to the frame decoder yet.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    read_pos: usize,
}

const READ_CHUNK: usize = 64;

impl Buffer {
    pub fn new() -> Buffer {
        Buffer {
            data: Vec::with_capacity(READ_CHUNK),
            read_pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the next unread byte.
    pub fn pop(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.read_pos)?;
        self.read_pos += 1;
        if self.read_pos == self.data.len() {
            self.clear();
        }
        Some(byte)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        if self.read_pos == self.data.len() {
            self.clear();
        }
        self.data.extend_from_slice(bytes);
    }

    /// Append up to one chunk read from `reader`, returning the number of new bytes.
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<usize> {
        let mut chunk = [0; READ_CHUNK];
        let len = reader.read(&mut chunk)?;
        self.write(&chunk[..len]);
        Ok(len)
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}
