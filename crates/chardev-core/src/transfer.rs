use crate::error::TransferFault;

/// Bytes supplied by a caller on the far side of the trust boundary.
pub trait TransferIn {
    /// Number of bytes the caller offered.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the first `dst.len()` offered bytes into `dst`.
    /// Either the whole copy happens or the call faults.
    fn copy_to(&self, dst: &mut [u8]) -> Result<(), TransferFault>;
}

/// Destination owned by a caller on the far side of the trust boundary.
pub trait TransferOut {
    fn copy_from(&mut self, src: &[u8]) -> Result<(), TransferFault>;
}

impl TransferIn for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_to(&self, dst: &mut [u8]) -> Result<(), TransferFault> {
        let src = self.get(..dst.len()).ok_or(TransferFault)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

impl TransferIn for Vec<u8> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn copy_to(&self, dst: &mut [u8]) -> Result<(), TransferFault> {
        <[u8] as TransferIn>::copy_to(self, dst)
    }
}

impl TransferOut for Vec<u8> {
    fn copy_from(&mut self, src: &[u8]) -> Result<(), TransferFault> {
        self.extend_from_slice(src);
        Ok(())
    }
}

/// Caller memory that cannot be touched: every copy faults.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultyTransfer {
    pub len: usize,
}

impl TransferIn for FaultyTransfer {
    fn len(&self) -> usize {
        self.len
    }

    fn copy_to(&self, _dst: &mut [u8]) -> Result<(), TransferFault> {
        Err(TransferFault)
    }
}

impl TransferOut for FaultyTransfer {
    fn copy_from(&mut self, _src: &[u8]) -> Result<(), TransferFault> {
        Err(TransferFault)
    }
}
