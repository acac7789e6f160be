//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::{
    ImgWriteVis, LabelVolume, ManualVolume, MaskSlice, MaskSliceMut, MaskVolume, OwnedMaskSlice,
    SpxSlice, VolumeAttr,
};

pub use crate::consts::marker::{EMPTY, LESION, MANUAL_ADD, MANUAL_REMOVE, SP_FOREGROUND};
pub use crate::consts::{KNEE_CASE_LIST, RATER_LEN, SPA_CASE_LIST};

pub use crate::raw::{self, RawError, RawMeta, RawVolume, SampleWidth};

pub use crate::reconcile::{ReconcileError, ReconcileParams, Reconciled};
#[cfg(feature = "rayon")]
pub use crate::reconcile::par_reconcile;
pub use crate::reconcile::reconcile;

pub use crate::similarity::{self, Similarity};

pub use crate::study::{
    self, Annotation, AnnotationType, BodyRegion, MeasurementKey, Protocol, Series, StudyConfig,
    StudyData, StudyError,
};

pub use crate::agreement::{agreement_area_ratio, manual_to_sp_ratio, AgreementRatios};
