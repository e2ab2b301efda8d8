//! Record, record array and packet types
//!
//! A [`Data`] is an ordered list of byte buffers, one per payload slot of the
//! schema that produced it. Records do not know their schema; field accessors
//! address them by slot index, offset and size.

/// One event record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Data {
    pub(crate) payload: Vec<Vec<u8>>,
    pub(crate) seq: u32,
}

impl Data {
    /// Builds a record from raw payload slots.
    ///
    /// Records built this way are not checked against any schema; accessors
    /// still bound every read.
    pub fn from_payload(payload: Vec<Vec<u8>>) -> Self {
        Self { payload, seq: 0 }
    }

    pub fn payload(&self) -> &[Vec<u8>] {
        &self.payload
    }

    /// Mutable access to the raw slots.
    pub fn payload_mut(&mut self) -> &mut [Vec<u8>] {
        &mut self.payload
    }

    pub fn slot(&self, index: u32) -> Option<&[u8]> {
        self.payload.get(index as usize).map(Vec::as_slice)
    }

    pub fn slot_count(&self) -> usize {
        self.payload.len()
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn set_seq(&mut self, seq: u32) {
        self.seq = seq;
    }
}

/// An ordered batch of records sharing one sequence number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataArray {
    pub(crate) records: Vec<Data>,
    pub(crate) seq: u32,
}

impl DataArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: Data) {
        self.records.push(data);
    }

    pub fn get(&self, index: usize) -> Option<&Data> {
        self.records.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Data> {
        self.records.get_mut(index)
    }

    /// Removes and returns the record at `index`, shifting later records down.
    pub fn remove(&mut self, index: usize) -> Option<Data> {
        if index < self.records.len() { Some(self.records.remove(index)) } else { None }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Data> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Data> {
        self.records.iter_mut()
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn set_seq(&mut self, seq: u32) {
        self.seq = seq;
    }
}

impl<'a> IntoIterator for &'a DataArray {
    type Item = &'a Data;
    type IntoIter = std::slice::Iter<'a, Data>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Transport-level envelope: one record or a batch of records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Single(Data),
    Array(DataArray),
}

impl Packet {
    pub fn seq(&self) -> u32 {
        match self {
            Packet::Single(data) => data.seq,
            Packet::Array(array) => array.seq,
        }
    }

    pub fn set_seq(&mut self, seq: u32) {
        match self {
            Packet::Single(data) => data.seq = seq,
            Packet::Array(array) => array.seq = seq,
        }
    }

    /// Number of records carried.
    pub fn len(&self) -> usize {
        match self {
            Packet::Single(_) => 1,
            Packet::Array(array) => array.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_single(&self) -> Option<&Data> {
        match self {
            Packet::Single(data) => Some(data),
            Packet::Array(_) => None,
        }
    }

    pub fn as_single_mut(&mut self) -> Option<&mut Data> {
        match self {
            Packet::Single(data) => Some(data),
            Packet::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&DataArray> {
        match self {
            Packet::Single(_) => None,
            Packet::Array(array) => Some(array),
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut DataArray> {
        match self {
            Packet::Single(_) => None,
            Packet::Array(array) => Some(array),
        }
    }

    /// Records carried by this packet, in order.
    pub fn records(&self) -> &[Data] {
        match self {
            Packet::Single(data) => std::slice::from_ref(data),
            Packet::Array(array) => &array.records,
        }
    }
}

impl From<Data> for Packet {
    fn from(data: Data) -> Self {
        Packet::Single(data)
    }
}

impl From<DataArray> for Packet {
    fn from(array: DataArray) -> Self {
        Packet::Array(array)
    }
}
