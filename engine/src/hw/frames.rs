/// One block of planar sample frames: primary channels plus auxiliary
/// channels running at a lower rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Frames {
    frames: usize,
    aux_frames: usize,
    primary: Vec<f32>,
    aux: Vec<f32>,
}

impl Frames {
    pub fn new(channels: usize, frames: usize, aux_channels: usize, aux_frames: usize) -> Self {
        Self {
            frames,
            aux_frames,
            primary: vec![0.0; channels * frames],
            aux: vec![0.0; aux_channels * aux_frames],
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn aux_frames(&self) -> usize {
        self.aux_frames
    }

    pub fn channels(&self) -> usize {
        if self.frames == 0 { 0 } else { self.primary.len() / self.frames }
    }

    pub fn aux_channels(&self) -> usize {
        if self.aux_frames == 0 { 0 } else { self.aux.len() / self.aux_frames }
    }

    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.primary[ch * self.frames..(ch + 1) * self.frames]
    }

    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        &mut self.primary[ch * self.frames..(ch + 1) * self.frames]
    }

    pub fn aux(&self, ch: usize) -> &[f32] {
        &self.aux[ch * self.aux_frames..(ch + 1) * self.aux_frames]
    }

    pub fn aux_mut(&mut self, ch: usize) -> &mut [f32] {
        &mut self.aux[ch * self.aux_frames..(ch + 1) * self.aux_frames]
    }

    pub fn clear(&mut self) {
        self.primary.fill(0.0);
        self.aux.fill(0.0);
    }

    /// Largest absolute sample over every channel.
    pub fn peak(&self) -> f32 {
        self.primary
            .iter()
            .chain(self.aux.iter())
            .fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }
}
