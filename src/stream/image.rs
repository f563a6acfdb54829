//! The finalized output of a stream.
//!
//! An [`Image`] is what [`crate::Stream::finalize`] produces: the concatenated and patched
//! block bytes, the relocation table, the region every block ended up in, and the resolved
//! absolute offset of every bound pointer. It can be written to any pair of byte sinks, or
//! directly to two files.

use std::{io::Write, path::Path};

use crate::{
    io::{read, ByteOrder},
    stream::{
        layout::BlockRegion, output::Output, pointer::Pointer, relocation::RelocationTable,
    },
    utils::to_u64,
    Result,
};

/// A fully laid out and patched output artifact.
#[derive(Debug, Clone)]
pub struct Image {
    pub(crate) data: Vec<u8>,
    pub(crate) relocations: RelocationTable,
    pub(crate) regions: Vec<BlockRegion>,
    pub(crate) targets: Vec<Option<u64>>,
    pub(crate) stream_id: usize,
    pub(crate) byte_order: ByteOrder,
}

impl Image {
    /// The data blob: every block in creation order.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Total size of the data blob in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the data blob is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Absolute positions of every pointer slot in the data blob.
    #[must_use]
    pub fn relocations(&self) -> &RelocationTable {
        &self.relocations
    }

    /// The region of each block, in creation order.
    #[must_use]
    pub fn regions(&self) -> &[BlockRegion] {
        &self.regions
    }

    /// Byte order the image was written in.
    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Absolute offset of a pointer's target.
    ///
    /// Returns `None` for pointers allocated by a different stream and for pointers that
    /// were allocated but never bound to a location.
    #[must_use]
    pub fn resolve(&self, ptr: Pointer) -> Option<u64> {
        if ptr.stream_id() != self.stream_id {
            return None;
        }
        self.targets.get(ptr.index()).copied().flatten()
    }

    /// Reads back the value stored in the pointer slot at absolute offset `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the slot does not lie inside the data blob.
    pub fn read_pointer(&self, slot: u64) -> Result<u64> {
        let start = usize::try_from(slot).map_err(|_| crate::Error::OutOfBounds)?;
        let Some(bytes) = self.data.get(start..) else {
            return Err(crate::Error::OutOfBounds);
        };
        read::<u64>(bytes, self.byte_order)
    }

    /// The serialized relocation table.
    #[must_use]
    pub fn relocation_bytes(&self) -> Vec<u8> {
        self.relocations.to_bytes(self.byte_order)
    }

    /// Writes the data blob to `data_sink` and the relocation table to `reloc_sink`.
    ///
    /// Both sinks are flushed. Nothing is retried; on failure the contents of either sink
    /// must be treated as invalid.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] on the first failed write or flush.
    pub fn write_to<D, R>(&self, data_sink: &mut D, reloc_sink: &mut R) -> Result<()>
    where
        D: Write + ?Sized,
        R: Write + ?Sized,
    {
        data_sink.write_all(&self.data)?;
        data_sink.flush()?;

        reloc_sink.write_all(&self.relocation_bytes())?;
        reloc_sink.flush()?;

        log::debug!(
            "Emitted {} data bytes and {} relocation entries",
            self.data.len(),
            self.relocations.len()
        );
        Ok(())
    }

    /// Writes the data blob and the relocation table to two files.
    ///
    /// Both files are written to temporary siblings first and only moved into place once
    /// both have been flushed. If anything fails before that, the target paths are left as
    /// they were. If moving the relocation table fails after the data file was moved, the
    /// data file is removed again.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] or [`crate::Error::MmapFailed`] if a file cannot be
    /// created, mapped, flushed, or moved into place.
    pub fn write_to_files<P, Q>(&self, data_path: P, reloc_path: Q) -> Result<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let relocation_bytes = self.relocation_bytes();

        let mut data_out = Output::create(data_path.as_ref(), to_u64(self.data.len())?)?;
        data_out.write_at(0, &self.data)?;

        let mut reloc_out = Output::create(reloc_path.as_ref(), to_u64(relocation_bytes.len())?)?;
        reloc_out.write_at(0, &relocation_bytes)?;

        data_out.flush()?;
        reloc_out.flush()?;

        data_out.finalize()?;
        if let Err(error) = reloc_out.finalize() {
            let _ = std::fs::remove_file(data_path.as_ref());
            return Err(error);
        }

        log::debug!(
            "Wrote {} ({} bytes) and {} ({} relocations)",
            data_path.as_ref().display(),
            self.data.len(),
            reloc_path.as_ref().display(),
            self.relocations.len()
        );
        Ok(())
    }

    /// Consumes the image, returning the data blob and the relocation table.
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, RelocationTable) {
        (self.data, self.relocations)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use crate::{Error, Stream, StreamConfig};

    struct BrokenSink;

    impl io::Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn image() -> super::Image {
        let mut stream = Stream::new(StreamConfig::default()).unwrap();
        let child = stream.open_block().unwrap();
        stream.write_uint16(0xBEEF).unwrap();
        stream.close_block().unwrap();
        stream.write_pointer(child).unwrap();
        stream.write_pointer(child).unwrap();
        stream.finalize().unwrap()
    }

    #[test]
    fn test_accessors() {
        let image = image();
        assert_eq!(image.len(), 24);
        assert!(!image.is_empty());
        assert_eq!(image.regions().len(), 2);
        assert_eq!(image.relocations().len(), 2);
        assert_eq!(image.read_pointer(0).unwrap(), 16);
        assert_eq!(image.read_pointer(8).unwrap(), 16);
        assert!(matches!(image.read_pointer(20), Err(Error::OutOfBounds)));
        assert!(matches!(image.read_pointer(u64::MAX), Err(Error::OutOfBounds)));
    }

    #[test]
    fn test_write_to_buffers() {
        let image = image();
        let mut data = Vec::new();
        let mut relocations = Vec::new();
        image.write_to(&mut data, &mut relocations).unwrap();

        assert_eq!(data, image.data());
        assert_eq!(relocations, image.relocation_bytes());
        assert_eq!(relocations.len(), 16);
    }

    #[test]
    fn test_write_to_failing_sink() {
        let image = image();
        let mut relocations = Vec::new();
        let result = image.write_to(&mut BrokenSink, &mut relocations);

        assert!(matches!(result, Err(Error::FileError(_))));
        assert!(relocations.is_empty());
    }

    #[test]
    fn test_into_parts() {
        let image = image();
        let expected = image.data().to_vec();
        let (data, relocations) = image.into_parts();
        assert_eq!(data, expected);
        assert_eq!(relocations.iter().collect::<Vec<_>>(), vec![0, 8]);
    }
}
