use std::io::{self, BufRead, Read, Write};

use buffer_redux::BufReader;
use bytes::{Buf, BytesMut};
use chrono::{DateTime, Utc};
use digest::DynDigest;
use log::{debug, warn};
use zeroize::Zeroizing;

use crate::{
    armor::{self, Dearmor},
    composed::{verify::outcome, Key},
    crypto::{
        aead, checksum, rsa,
        sym::{self, SymmetricKeyAlgorithm},
    },
    errors::{
        ensure_eq, format_err, malformed_err, unimplemented_err, unsupported_err, Error, Result,
    },
    normalize_lines::CrlfWriter,
    packet::{
        DataMode, Decompressor, EncryptedSessionKey, Envelope, LiteralDataHeader,
        OnePassSignature, PacketParser, PublicKeyEncryptedSessionKey, SignatureRecord,
        SignatureType, SymKeyEncryptedSessionKey,
    },
    parsing_reader::BufReadParsing,
    types::{Fingerprint, Password, SecretParams, Tag},
};

/// Largest slice of plaintext handed out at once.
const BUFFER_SIZE: usize = 8 * 1024;

/// One layer of the message, a packet stream over the layer enclosing it.
type Layer<'a> = PacketParser<Source<'a>>;

/// What a layer reads from.
enum Source<'a> {
    /// The input, dearmored if needed.
    Input(Box<dyn BufRead + 'a>),
    Cfb(Box<sym::StreamDecryptor<Layer<'a>>>),
    Aead(Box<aead::StreamDecryptor<Layer<'a>>>),
    Compressed(Box<BufReader<Decompressor<Layer<'a>>>>),
}

impl Source<'_> {
    /// Reads the enclosing layers to their end.
    ///
    /// Integrity checks run once a layer is exhausted, which compressed data
    /// or trailing packets can otherwise prevent.
    fn finish(&mut self) -> Result<()> {
        let enclosing = match self {
            Self::Input(_) => return Ok(()),
            Self::Cfb(r) => {
                r.drain().map_err(Error::from_io)?;
                match r.get_mut() {
                    Some(layer) => layer,
                    None => return Err(format_err!("decryptor failed")),
                }
            }
            Self::Aead(r) => {
                r.drain().map_err(Error::from_io)?;
                r.get_mut()
            }
            Self::Compressed(r) => {
                r.drain().map_err(Error::from_io)?;
                r.get_mut().get_mut()
            }
        };
        finish_layer(enclosing)
    }
}

fn finish_layer(layer: &mut Layer<'_>) -> Result<()> {
    layer.drain().map_err(Error::from_io)?;
    while let Some(header) = layer.next_header()? {
        debug!("skipping trailing {:?} packet", header.tag);
        layer.drain().map_err(Error::from_io)?;
    }
    layer.get_mut().finish()
}

impl BufRead for Source<'_> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            Self::Input(r) => r.fill_buf(),
            Self::Cfb(r) => r.fill_buf(),
            Self::Aead(r) => r.fill_buf(),
            Self::Compressed(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Self::Input(r) => r.consume(amt),
            Self::Cfb(r) => r.consume(amt),
            Self::Aead(r) => r.consume(amt),
            Self::Compressed(r) => r.consume(amt),
        }
    }
}

impl Read for Source<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Input(r) => r.read(buf),
            Self::Cfb(r) => r.read(buf),
            Self::Aead(r) => r.read(buf),
            Self::Compressed(r) => r.read(buf),
        }
    }
}

/// A decrypted session key.
#[derive(derive_more::Debug)]
pub struct SessionKey {
    pub sym_alg: SymmetricKeyAlgorithm,
    #[debug("***")]
    pub key: Zeroizing<Vec<u8>>,
    /// The key that unwrapped it, `None` if it was derived from a password.
    pub fingerprint: Option<Fingerprint>,
}

impl SessionKey {
    /// Parses `sym-alg || key || checksum`, the plaintext of a PKESK.
    fn from_unwrapped(plain: &[u8], fingerprint: Fingerprint) -> Result<Self> {
        let [alg, rest @ ..] = plain else {
            malformed_err!("empty session key");
        };
        if rest.len() <= 2 {
            malformed_err!("session key of {} bytes", rest.len());
        }
        let (key, sum) = rest.split_at(rest.len() - 2);
        checksum::simple(sum.try_into()?, key)?;

        let sym_alg = SymmetricKeyAlgorithm::from(*alg);
        ensure_eq!(sym_alg.key_size(), key.len(), "session key size for {:?}", sym_alg);

        Ok(Self {
            sym_alg,
            key: Zeroizing::new(key.to_vec()),
            fingerprint: Some(fingerprint),
        })
    }
}

/// A decrypted message, positioned at the start of its literal data.
#[derive(Debug)]
pub struct DecryptedMessage<'a> {
    reader: PlaintextReader<'a>,
    file_name: Option<String>,
    created: Option<DateTime<Utc>>,
    session_key: Option<SessionKey>,
}

impl<'a> DecryptedMessage<'a> {
    /// The session key, `None` for messages that were not encrypted.
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    /// Splits the message into the plaintext reader, the file name and the
    /// date of the literal data.
    pub fn into_parts(self) -> (PlaintextReader<'a>, Option<String>, Option<DateTime<Utc>>) {
        (self.reader, self.file_name, self.created)
    }
}

/// Decrypts an OpenPGP message.
///
/// Session keys are unwrapped with the keys `key_lookup` returns for the key
/// id of each PKESK, or derived from `password` for SKESKs. Decryption,
/// decompression and the literal data are streamed: nothing but the packet
/// headers is read before this returns.
///
/// The returned plaintext is only authenticated once it was read to its end.
pub fn decrypt<'a, R, F>(
    ciphertext: R,
    key_lookup: F,
    password: Option<&Password>,
) -> Result<DecryptedMessage<'a>>
where
    R: BufRead + 'a,
    F: Fn(&[u8]) -> Option<Key>,
{
    decrypt_inner(ciphertext, key_lookup, password).map_err(Error::untunnel)
}

fn decrypt_inner<'a, R, F>(
    ciphertext: R,
    key_lookup: F,
    password: Option<&Password>,
) -> Result<DecryptedMessage<'a>>
where
    R: BufRead + 'a,
    F: Fn(&[u8]) -> Option<Key>,
{
    let (armored, ciphertext) = armor::detect(ciphertext)?;
    let source: Box<dyn BufRead + 'a> = if armored {
        let mut dearmor = Dearmor::new(ciphertext);
        let typ = dearmor.read_header()?;
        debug!("decrypting armored {}", typ);
        Box::new(dearmor)
    } else {
        Box::new(ciphertext)
    };

    let mut current: Layer<'a> = PacketParser::new(Source::Input(source));
    let mut session: Option<SessionKey> = None;
    // the first failure to unwrap a session key, reported if no other works
    let mut deferred: Option<Error> = None;
    let mut one_pass = Vec::new();
    let mut leading = Vec::new();

    loop {
        let Some(header) = current.next_header()? else {
            malformed_err!("message without literal data");
        };
        if current.envelope() != Some(Envelope::OpenPgp) {
            malformed_err!("expected an OpenPGP message, found {:?}", current.envelope());
        }

        match header.tag {
            Tag::PublicKeyEncryptedSessionKey => {
                let pkesk = PublicKeyEncryptedSessionKey::try_from_reader(&mut current)?;
                if session.is_some() {
                    continue;
                }
                match unwrap_session_key(&pkesk, &key_lookup) {
                    Ok(unwrapped) => session = unwrapped,
                    Err(err) => {
                        warn!("failed to unwrap session key for {:?}: {}", pkesk.id, err);
                        deferred.get_or_insert(err);
                    }
                }
            }
            Tag::SymKeyEncryptedSessionKey => {
                let skesk = SymKeyEncryptedSessionKey::try_from_reader(&mut current)?;
                if session.is_some() {
                    continue;
                }
                let Some(password) = password else {
                    debug!("skipping SKESK, no password given");
                    continue;
                };
                match skesk.decrypt(&password.read()) {
                    Ok((sym_alg, key)) => {
                        session = Some(SessionKey {
                            sym_alg,
                            key,
                            fingerprint: None,
                        })
                    }
                    Err(err) => {
                        warn!("failed to derive session key: {}", err);
                        deferred.get_or_insert(err);
                    }
                }
            }
            Tag::SymEncryptedProtectedData | Tag::SymEncryptedData => {
                let Some(sk) = &session else {
                    return Err(deferred.unwrap_or(Error::MissingKey));
                };
                let decryptor = if header.tag == Tag::SymEncryptedProtectedData {
                    let version = current.read_u8()?;
                    if version != 1 {
                        unsupported_err!("SEIPD version {}", version);
                    }
                    sk.sym_alg.stream_decryptor_protected(&sk.key, current)?
                } else {
                    sk.sym_alg.stream_decryptor_unprotected(&sk.key, current)?
                };
                debug!("entering {:?} with {:?}", header.tag, sk.sym_alg);
                current = PacketParser::new(Source::Cfb(Box::new(decryptor)));
            }
            Tag::GnupgAead => {
                let Some(sk) = &session else {
                    return Err(deferred.unwrap_or(Error::MissingKey));
                };
                let version = current.read_u8()?;
                if version != 1 {
                    unsupported_err!("AEAD encrypted data version {}", version);
                }
                let sym_alg = SymmetricKeyAlgorithm::from(current.read_u8()?);
                let aead_alg = aead::AeadAlgorithm::from(current.read_u8()?);
                let chunk_size_byte = current.read_u8()?;
                let Some(iv_len) = aead_alg.iv_size() else {
                    unsupported_err!("AEAD algorithm {:?}", aead_alg);
                };
                let iv = current.take_bytes(iv_len)?;
                if sym_alg != sk.sym_alg {
                    debug!("session key for {:?} used with {:?}", sk.sym_alg, sym_alg);
                }

                let decryptor = aead::StreamDecryptor::new(
                    sym_alg,
                    aead_alg,
                    chunk_size_byte,
                    &sk.key,
                    &iv,
                    current,
                )?;
                debug!("entering AEAD data with {:?}", sym_alg);
                current = PacketParser::new(Source::Aead(Box::new(decryptor)));
            }
            Tag::CompressedData => {
                let decompressor = Decompressor::from_reader(current)?;
                debug!("entering compressed data");
                current =
                    PacketParser::new(Source::Compressed(Box::new(BufReader::new(decompressor))));
            }
            Tag::OnePassSignature => {
                one_pass.push(OnePassSignature::try_from_reader(&mut current)?);
            }
            Tag::Signature => {
                leading.push(SignatureRecord::try_from_reader(&mut current)?);
            }
            Tag::LiteralData => {
                let literal = LiteralDataHeader::try_from_reader(&mut current)?;
                debug!("literal data {:?}", literal);
                let reader = PlaintextReader::new(current, literal.mode, one_pass, leading)?;
                return Ok(DecryptedMessage {
                    reader,
                    file_name: literal.file_name(),
                    created: literal.created,
                    session_key: session,
                });
            }
            tag => {
                debug!("skipping {:?} packet", tag);
                current.drain()?;
            }
        }
    }
}

/// Unwraps the session key of a PKESK, if `key_lookup` knows a key for it.
fn unwrap_session_key<F>(
    pkesk: &PublicKeyEncryptedSessionKey,
    key_lookup: &F,
) -> Result<Option<SessionKey>>
where
    F: Fn(&[u8]) -> Option<Key>,
{
    let id = pkesk.id.as_ref();
    let Some(key) = key_lookup(id) else {
        debug!("no key for PKESK to {:?}", pkesk.id);
        return Ok(None);
    };

    let candidate = if pkesk.id.is_wildcard() {
        std::iter::once(&key)
            .chain(key.subkeys.iter())
            .find(|k| k.can_decrypt())
    } else {
        key.match_fingerprint(id)
    };
    let Some(decryptor) = candidate else {
        debug!("key {:?} does not match PKESK to {:?}", key.fingerprint, pkesk.id);
        return Ok(None);
    };

    match (&pkesk.values, &decryptor.secret_params) {
        (EncryptedSessionKey::Rsa { mpi }, Some(SecretParams::Rsa(priv_key))) => {
            let plain = rsa::decrypt(priv_key, std::slice::from_ref(mpi))?;
            let session = SessionKey::from_unwrapped(&plain, decryptor.fingerprint.clone())?;
            debug!(
                "unwrapped {:?} session key with {:?}",
                session.sym_alg, decryptor.fingerprint
            );
            Ok(Some(session))
        }
        (_, None | Some(SecretParams::Encrypted { .. })) => {
            debug!(
                "skipping key {:?}, no usable secret material",
                decryptor.fingerprint
            );
            Ok(None)
        }
        (EncryptedSessionKey::Rsa { .. }, Some(SecretParams::Plain)) => {
            debug!("key {:?} holds no RSA secret", decryptor.fingerprint);
            Ok(None)
        }
        (_, Some(_)) => unimplemented_err!("session key decryption with {:?}", pkesk.pub_alg),
    }
}

/// `io::Write` sink feeding an owned hasher.
struct HashWriter(Box<dyn DynDigest + Send>);

impl Write for HashWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Digest of the literal data for one signature, normalizing line endings
/// for text signatures.
enum SignatureHasher {
    Binary(HashWriter),
    Text(CrlfWriter<HashWriter>),
}

impl SignatureHasher {
    fn new(hasher: Box<dyn DynDigest + Send>, typ: SignatureType) -> Self {
        if typ == SignatureType::Text {
            Self::Text(CrlfWriter::new(HashWriter(hasher)))
        } else {
            Self::Binary(HashWriter(hasher))
        }
    }

    fn update(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Binary(w) => w.write_all(data),
            Self::Text(w) => w.write_all(data),
        }
    }

    fn into_inner(self) -> Box<dyn DynDigest + Send> {
        match self {
            Self::Binary(w) => w.0,
            Self::Text(w) => w.into_inner().0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Body,
    Done,
}

/// Streams the literal data of a decrypted message.
///
/// Signatures over the data are digested while it streams. Once the data
/// was read to its end, the signature packets following it are read, and
/// [`PlaintextReader::verify_signature`] checks them.
///
/// Errors of the layers beneath, such as a failed integrity check, surface
/// as [`io::Error`]s wrapping an [`Error`].
#[derive(derive_more::Debug)]
pub struct PlaintextReader<'a> {
    #[debug(skip)]
    source: Layer<'a>,
    mode: DataMode,
    state: ReaderState,
    #[debug("{} bytes", buffer.len())]
    buffer: BytesMut,
    #[debug("{} pending", one_pass.len())]
    one_pass: Vec<(OnePassSignature, SignatureHasher)>,
    #[debug("{} pending", leading.len())]
    leading: Vec<(SignatureRecord, SignatureHasher)>,
    /// Completed signatures with the digest of the data they cover.
    #[debug(skip)]
    signatures: Vec<(SignatureRecord, Vec<u8>)>,
}

impl<'a> PlaintextReader<'a> {
    fn new(
        source: Layer<'a>,
        mode: DataMode,
        one_pass: Vec<OnePassSignature>,
        leading: Vec<SignatureRecord>,
    ) -> Result<Self> {
        let one_pass = one_pass
            .into_iter()
            .map(|ops| {
                let hasher = ops.hash_alg.new_hasher()?;
                let hasher = SignatureHasher::new(hasher, ops.typ);
                Ok((ops, hasher))
            })
            .collect::<Result<Vec<_>>>()?;
        let leading = leading
            .into_iter()
            .map(|sig| {
                let hasher = SignatureHasher::new(sig.new_hasher()?, sig.typ);
                Ok((sig, hasher))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            source,
            mode,
            state: ReaderState::Body,
            buffer: BytesMut::with_capacity(BUFFER_SIZE),
            one_pass,
            leading,
            signatures: Vec::new(),
        })
    }

    pub fn mode(&self) -> DataMode {
        self.mode
    }

    pub fn is_done(&self) -> bool {
        self.state == ReaderState::Done
    }

    /// The signatures found after the data, available once it was read.
    pub fn signatures(&self) -> impl Iterator<Item = &SignatureRecord> {
        self.signatures.iter().map(|(sig, _)| sig)
    }

    /// Checks the signatures over the data against `key` and its subkeys.
    ///
    /// Returns `true` as soon as one signature verifies. The data must have
    /// been read to its end.
    pub fn verify_signature(&self, key: &Key) -> Result<bool> {
        if !self.is_done() {
            return Err(format_err!("plaintext was not read to its end"));
        }
        if self.signatures.is_empty() {
            return Err(Error::MissingSignature);
        }

        for (sig, digest) in &self.signatures {
            let signer = match sig.issuer_needle() {
                Some(needle) => key.match_fingerprint(&needle),
                None => Some(key),
            };
            let Some(signer) = signer else {
                debug!("no key matches issuer of {:?}", sig.issuer);
                continue;
            };
            if outcome(signer.params.verify(sig.hash_alg, digest, &sig.values))? {
                debug!("message signature by {:?} verified", signer.fingerprint);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn fill_inner(&mut self) -> io::Result<()> {
        let buf = self.source.fill_buf()?;
        if buf.is_empty() {
            self.finish()?;
            return Ok(());
        }

        let len = buf.len().min(BUFFER_SIZE);
        let data = &buf[..len];
        for (_, hasher) in &mut self.one_pass {
            hasher.update(data)?;
        }
        for (_, hasher) in &mut self.leading {
            hasher.update(data)?;
        }
        self.buffer.extend_from_slice(data);
        self.source.consume(len);
        Ok(())
    }

    /// Reads the packets following the data and completes the digests.
    fn finish(&mut self) -> Result<()> {
        for (sig, hasher) in std::mem::take(&mut self.leading) {
            let digest = sig.finish_hasher(hasher.into_inner());
            self.complete(sig, digest)?;
        }

        while let Some(header) = self.source.next_header()? {
            if header.tag != Tag::Signature {
                debug!("skipping {:?} packet after literal data", header.tag);
                self.source.drain()?;
                continue;
            }

            let sig = SignatureRecord::try_from_reader(&mut self.source)?;
            // signatures follow in the reverse order of their one pass packets
            let Some((ops, hasher)) = self.one_pass.pop() else {
                warn!("signature without a one pass signature, ignoring it");
                continue;
            };
            if ops.hash_alg != sig.hash_alg {
                malformed_err!(
                    "one pass signature for {:?} closed by a {:?} signature",
                    ops.hash_alg,
                    sig.hash_alg
                );
            }
            let digest = sig.finish_hasher(hasher.into_inner());
            self.complete(sig, digest)?;
        }

        if !self.one_pass.is_empty() {
            warn!("{} one pass signatures without signature", self.one_pass.len());
        }
        self.source.get_mut().finish()?;
        self.state = ReaderState::Done;
        Ok(())
    }

    fn complete(&mut self, sig: SignatureRecord, digest: Vec<u8>) -> Result<()> {
        if !sig.matches_prefix(&digest) {
            return Err(Error::ChecksumMismatch {
                message: format!(
                    "signature hash prefix {} does not match the data",
                    hex::encode(sig.hash_prefix)
                ),
            });
        }
        self.signatures.push((sig, digest));
        Ok(())
    }
}

impl BufRead for PlaintextReader<'_> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.buffer.is_empty() && self.state == ReaderState::Body {
            if let Err(err) = self.fill_inner() {
                return Err(match Error::from_io(err) {
                    err @ Error::ChecksumMismatch { .. } | err @ Error::MalformedPacket { .. } => {
                        io::Error::new(io::ErrorKind::InvalidData, err)
                    }
                    other => other.into(),
                });
            }
        }
        Ok(&self.buffer[..])
    }

    fn consume(&mut self, amt: usize) {
        self.buffer.advance(amt);
    }
}

impl Read for PlaintextReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.consume(len);
        Ok(len)
    }
}
