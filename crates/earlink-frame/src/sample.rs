use serde::Serialize;

/// One decoded sample row.
///
/// Slots not filled by the decoder stay at zero. Slot meaning comes from the
/// [`ChannelLayout`](crate::layout::ChannelLayout) used to decode it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Sample {
    values: Vec<f64>,
}

impl Sample {
    /// A row of `num_rows` zeros.
    pub fn zeroed(num_rows: usize) -> Self {
        Self {
            values: vec![0.0; num_rows],
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value at `index`, or zero when the row is shorter.
    pub fn get(&self, index: usize) -> f64 {
        self.values.get(index).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub(crate) fn set(&mut self, index: usize, value: f64) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }
}

/// Receives decoded samples.
///
/// The sink takes ownership of each row; nothing here keeps a reference to it.
/// Implemented for any `FnMut(Sample) + Send` closure.
pub trait SampleSink: Send {
    fn push(&mut self, sample: Sample);
}

impl<F> SampleSink for F
where
    F: FnMut(Sample) + Send,
{
    fn push(&mut self, sample: Sample) {
        self(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_row() {
        let sample = Sample::zeroed(4);
        assert_eq!(sample.values(), &[0.0; 4]);
        assert_eq!(sample.get(10), 0.0);
        assert!(!sample.is_empty());
    }

    #[test]
    fn set_ignores_out_of_range() {
        let mut sample = Sample::zeroed(2);
        sample.set(1, 3.5);
        sample.set(5, 1.0);
        assert_eq!(sample.into_values(), vec![0.0, 3.5]);
    }

    #[test]
    fn closures_are_sinks() {
        let mut collected = Vec::new();
        {
            let mut sink = |sample: Sample| collected.push(sample);
            sink.push(Sample::zeroed(1));
            sink.push(Sample::zeroed(2));
        }
        assert_eq!(collected.len(), 2);
    }

    #[test]
    fn serializes_as_plain_array() {
        let mut sample = Sample::zeroed(3);
        sample.set(0, 1.5);
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, "[1.5,0.0,0.0]");
    }
}
