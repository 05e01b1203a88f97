pub(crate) mod limits {
    /// Maximum count allowed in a read holding registers request.
    ///
    /// The quantity field of the response is carried in a single byte-count
    /// octet, which caps a read at 125 registers per request.
    pub(crate) const MAX_READ_REGISTERS_COUNT: u16 = 0x007D;
}
