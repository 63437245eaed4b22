use std::io::{self, BufRead, Read};

use digest::DynDigest;
use log::debug;

use crate::{
    armor::{self, BlockType, Dearmor},
    composed::Key,
    crypto::hash::WriteHasher,
    errors::{malformed_err, unsupported_err, Error, Result},
    normalize_lines::CrlfWriter,
    packet::{ssh, Envelope, PacketParser, SignatureRecord},
    parsing_reader::BufReadParsing,
    types::Tag,
};

/// Verifies a detached signature over `document`.
///
/// `signature` is an OpenPGP signature or an `SSHSIG`, armored or binary.
/// OpenPGP signatures are checked against the key or subkey of `key` that
/// the issuer names, falling back to the primary key if the signature does
/// not name one. SSH signatures must embed `key` itself.
///
/// Returns `Ok(false)` for signatures that do not verify, including
/// malformed signature values. Missing input, unusable key material and
/// unsupported algorithms are errors.
pub fn verify<D: Read, S: BufRead>(document: D, signature: S, key: Option<&Key>) -> Result<bool> {
    verify_inner(document, signature, key).map_err(Error::untunnel)
}

fn verify_inner<D: Read, S: BufRead>(
    document: D,
    signature: S,
    key: Option<&Key>,
) -> Result<bool> {
    let (armored, signature) = armor::detect(signature)?;
    let sig = if armored {
        let mut dearmor = Dearmor::new(signature);
        let typ = dearmor.read_header()?;
        if !matches!(typ, BlockType::Signature | BlockType::SshSignature) {
            malformed_err!("expected a signature, found {}", typ);
        }
        read_signature(dearmor)?
    } else {
        read_signature(signature)?
    };

    let Some(key) = key else {
        return Err(Error::MissingKey);
    };

    let valid = match &sig.ssh {
        Some(_) => verify_ssh(document, &sig, key)?,
        None => verify_openpgp(document, &sig, key)?,
    };
    debug!("signature by {:?}: valid {}", sig.issuer_fingerprint, valid);
    Ok(valid)
}

/// Reads the first signature from a packet stream.
fn read_signature<R: BufRead>(source: R) -> Result<SignatureRecord> {
    let mut parser = PacketParser::new(source);

    while let Some(header) = parser.next_header()? {
        match (parser.envelope(), header.tag) {
            (Some(Envelope::SshSignature), _) => return ssh::parse_signature(&mut parser),
            (Some(Envelope::OpenPgp), Tag::Signature) => {
                return SignatureRecord::try_from_reader(&mut parser);
            }
            (Some(Envelope::OpenPgp), tag) => {
                debug!("skipping {:?} packet before the signature", tag);
                parser.drain()?;
            }
            (envelope, _) => malformed_err!("expected a signature, found {:?}", envelope),
        }
    }

    Err(Error::MissingSignature)
}

/// Feeds `document` into `hasher`, normalizing line endings for text
/// signatures.
fn hash_document<D: Read>(mut document: D, text: bool, hasher: &mut dyn DynDigest) -> Result<()> {
    if text {
        let mut writer = CrlfWriter::new(WriteHasher(hasher));
        io::copy(&mut document, &mut writer)?;
    } else {
        io::copy(&mut document, &mut WriteHasher(hasher))?;
    }
    Ok(())
}

fn verify_openpgp<D: Read>(document: D, sig: &SignatureRecord, key: &Key) -> Result<bool> {
    let signer = match sig.issuer_needle() {
        Some(needle) => match key.match_fingerprint(&needle) {
            Some(signer) => signer,
            None => {
                debug!("no key matches issuer {}", hex::encode(&needle));
                return Ok(false);
            }
        },
        None => key,
    };

    let mut hasher = sig.new_hasher()?;
    hash_document(document, sig.is_text(), &mut *hasher)?;
    let digest = sig.finish_hasher(hasher);

    if !sig.matches_prefix(&digest) {
        debug!(
            "hash prefix mismatch: {} != {}",
            hex::encode(&digest[..digest.len().min(2)]),
            hex::encode(sig.hash_prefix)
        );
        return Ok(false);
    }

    outcome(signer.params.verify(sig.hash_alg, &digest, &sig.values))
}

fn verify_ssh<D: Read>(document: D, sig: &SignatureRecord, key: &Key) -> Result<bool> {
    let Some(info) = &sig.ssh else {
        unsupported_err!("not an ssh signature");
    };
    if info.fingerprint != key.fingerprint {
        debug!(
            "ssh signature made by {:?}, not {:?}",
            info.fingerprint, key.fingerprint
        );
        return Ok(false);
    }

    let mut hasher = sig.hash_alg.new_hasher()?;
    hash_document(document, false, &mut *hasher)?;
    let message_digest = hasher.finalize();
    let signed = ssh::signed_data(sig, &message_digest)?;

    let res = match info.verification_hash() {
        Some(hash) => {
            let hashed = hash.digest(&signed)?;
            key.params.verify(hash, &hashed, &sig.values)
        }
        None => key.params.verify(sig.hash_alg, &signed, &sig.values),
    };
    outcome(res)
}

/// Maps the result of the public key operation to the verification outcome.
pub(super) fn outcome(res: Result<()>) -> Result<bool> {
    match res {
        Ok(()) => Ok(true),
        Err(
            err @ (Error::MalformedPacket { .. }
            | Error::Message { .. }
            | Error::SignatureError { .. }
            | Error::RSAError { .. }
            | Error::InvalidKeyLength
            | Error::TryFromSlice { .. }),
        ) => {
            debug!("signature rejected: {}", err);
            Ok(false)
        }
        Err(err) => Err(err),
    }
}
