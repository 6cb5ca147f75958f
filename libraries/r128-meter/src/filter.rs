//! K-weighting filter bank (ITU-R BS.1770-4)
//!
//! K-weighting is a cascade of two second-order sections per channel:
//! 1. Pre-filter: high shelf, about +4 dB above ~1.5 kHz (head acoustics)
//! 2. RLB filter: high-pass around 38 Hz (revised low-frequency B-curve)
//!
//! Coefficients are derived from the analog prototypes with the bilinear
//! transform, so any sample rate gets its own exact filter. At 48 kHz they
//! reproduce the tables in BS.1770-4.

use std::f64::consts::PI;

// Pre-filter analog prototype
const SHELF_FREQUENCY: f64 = 1681.974450955533;
const SHELF_GAIN_DB: f64 = 3.999843853973347;
const SHELF_Q: f64 = 0.7071752369554196;
const SHELF_BAND_EXPONENT: f64 = 0.4996667741545416;

// RLB analog prototype
const RLB_FREQUENCY: f64 = 38.13547087602444;
const RLB_Q: f64 = 0.5003270373238773;

/// Normalised biquad coefficients (a0 == 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoefficients {
    /// Stage 1 high-shelf pre-filter for `sample_rate` Hz
    pub fn pre_filter(sample_rate: f64) -> Self {
        let k = (PI * SHELF_FREQUENCY / sample_rate).tan();
        let vh = 10.0_f64.powf(SHELF_GAIN_DB / 20.0);
        let vb = vh.powf(SHELF_BAND_EXPONENT);
        let a0 = 1.0 + k / SHELF_Q + k * k;

        Self {
            b0: (vh + vb * k / SHELF_Q + k * k) / a0,
            b1: 2.0 * (k * k - vh) / a0,
            b2: (vh - vb * k / SHELF_Q + k * k) / a0,
            a1: 2.0 * (k * k - 1.0) / a0,
            a2: (1.0 - k / SHELF_Q + k * k) / a0,
        }
    }

    /// Stage 2 RLB high-pass for `sample_rate` Hz.
    ///
    /// The numerator is fixed at (1, -2, 1) as in BS.1770, which leaves the
    /// passband gain marginally above unity.
    pub fn rlb_filter(sample_rate: f64) -> Self {
        let k = (PI * RLB_FREQUENCY / sample_rate).tan();
        let a0 = 1.0 + k / RLB_Q + k * k;

        Self {
            b0: 1.0,
            b1: -2.0,
            b2: 1.0,
            a1: 2.0 * (k * k - 1.0) / a0,
            a2: (1.0 - k / RLB_Q + k * k) / a0,
        }
    }

    /// Magnitude response in dB at `frequency` Hz
    pub fn magnitude_db(&self, frequency: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let (cos_w, sin_w) = (w.cos(), w.sin());
        let (cos_2w, sin_2w) = ((2.0 * w).cos(), (2.0 * w).sin());

        let num_re = self.b0 + self.b1 * cos_w + self.b2 * cos_2w;
        let num_im = -self.b1 * sin_w - self.b2 * sin_2w;
        let den_re = 1.0 + self.a1 * cos_w + self.a2 * cos_2w;
        let den_im = -self.a1 * sin_w - self.a2 * sin_2w;

        let mag_sq = (num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im);
        10.0 * mag_sq.log10()
    }
}

/// Direct form I biquad: last two inputs and two outputs as state
#[derive(Debug, Clone)]
pub struct Biquad {
    coeffs: BiquadCoefficients,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    pub fn new(coeffs: BiquadCoefficients) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let c = &self.coeffs;
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    pub fn coefficients(&self) -> &BiquadCoefficients {
        &self.coeffs
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Pre-filter followed by RLB filter for one channel
#[derive(Debug, Clone)]
pub struct KWeightingFilter {
    pre: Biquad,
    rlb: Biquad,
}

impl KWeightingFilter {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            pre: Biquad::new(BiquadCoefficients::pre_filter(sample_rate)),
            rlb: Biquad::new(BiquadCoefficients::rlb_filter(sample_rate)),
        }
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        self.rlb.process(self.pre.process(x))
    }

    pub fn reset(&mut self) {
        self.pre.reset();
        self.rlb.reset();
    }
}

/// One K-weighting filter per channel
#[derive(Debug, Clone)]
pub struct FilterBank {
    filters: Vec<KWeightingFilter>,
}

impl FilterBank {
    /// Filter bank for `channels` channels at `sample_rate` Hz.
    ///
    /// The caller guarantees a positive sample rate (see `MeterConfig::validate`).
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        let filter = KWeightingFilter::new(f64::from(sample_rate));
        Self {
            filters: vec![filter; channels],
        }
    }

    /// Filter one sample of `channel`. Samples must arrive in stream order.
    #[inline]
    pub fn process(&mut self, channel: usize, sample: f64) -> f64 {
        self.filters[channel].process(sample)
    }

    pub fn channels(&self) -> usize {
        self.filters.len()
    }

    pub fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }
}
