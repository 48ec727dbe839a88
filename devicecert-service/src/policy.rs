//! Binding rule between a device identity and the certificate it presents.

use crate::certificate::DeviceCertificate;
use crate::identity::{ExternalDeviceId, RejectionReason};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentDecision {
    Accepted {
        external_id: ExternalDeviceId,
        certificate: DeviceCertificate,
    },
    Rejected(RejectionReason),
}

/// Accept iff the certificate CN is byte-for-byte the caller's device id.
///
/// No trimming, case folding or Unicode normalisation: anything looser lets
/// one device enroll a certificate naming another.
pub fn decide(external_id: ExternalDeviceId, certificate: DeviceCertificate) -> EnrollmentDecision {
    if external_id.as_str() == certificate.subject_common_name {
        EnrollmentDecision::Accepted {
            external_id,
            certificate,
        }
    } else {
        EnrollmentDecision::Rejected(RejectionReason::CommonNameMismatch)
    }
}
