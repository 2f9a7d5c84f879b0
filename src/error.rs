#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    NoMemory,
    InvalidConfig(&'static str),
    UnalignedRegion(usize),
    RegionTooSmall(usize),
    OutsidePool(usize),
    WrongChunk(usize),
    WrongPage(usize),
    ChunkAlreadyFree(usize),
    PageAlreadyFree(usize),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::NoMemory => write!(f, "slab alloc failed: no memory"),
            Error::InvalidConfig(what) => write!(f, "invalid pool config: {what}"),
            Error::UnalignedRegion(base) => {
                write!(f, "region base 0x{base:X} is not word aligned")
            }
            Error::RegionTooSmall(len) => {
                write!(f, "region of {len} bytes cannot hold a single data page")
            }
            Error::OutsidePool(ptr) => write!(f, "pointer 0x{ptr:X} is outside of pool"),
            Error::WrongChunk(ptr) => write!(f, "pointer 0x{ptr:X} to wrong chunk"),
            Error::WrongPage(ptr) => write!(f, "pointer 0x{ptr:X} to wrong page"),
            Error::ChunkAlreadyFree(ptr) => write!(f, "chunk 0x{ptr:X} is already free"),
            Error::PageAlreadyFree(ptr) => write!(f, "page 0x{ptr:X} is already free"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
