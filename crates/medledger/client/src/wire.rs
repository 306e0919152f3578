//! Legacy transaction wire format for a single memo instruction.
//!
//! Message layout:
//!
//! ```text
//! header          [required_signatures=1, readonly_signed=0, readonly_unsigned=1]
//! account keys    shortvec(2) payer memo_program
//! recent blockhash 32 bytes
//! instructions    shortvec(1) program_index=1 shortvec(1) [0] shortvec(len) payload
//! ```
//!
//! The transaction is `shortvec(1) signature message`; the signature over the message
//! doubles as the ledger reference.

use medledger_identity::SigningIdentity;
use medledger_types::{Address, LedgerReference};

/// Append a compact-u16 length prefix: 7 bits per byte, high bit set on all but the last.
pub fn encode_shortvec(len: u16, out: &mut Vec<u8>) {
    let mut remaining = len;
    loop {
        let mut byte = (remaining & 0x7f) as u8;
        remaining >>= 7;
        if remaining == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// A signed transaction ready for submission.
#[derive(Clone, Debug)]
pub struct SignedTransaction {
    pub signature: [u8; 64],
    pub bytes: Vec<u8>,
}

impl SignedTransaction {
    /// The reference the ledger will know this transaction by.
    pub fn reference(&self) -> LedgerReference {
        LedgerReference::new(bs58::encode(self.signature).into_string())
    }
}

/// Serialize the unsigned message. Payloads longer than `u16::MAX` are rejected.
pub fn memo_message(
    payer: &Address,
    memo_program: &Address,
    recent_blockhash: &[u8; 32],
    payload: &[u8],
) -> Option<Vec<u8>> {
    let payload_len = u16::try_from(payload.len()).ok()?;

    let mut message = Vec::with_capacity(3 + 1 + 64 + 32 + 4 + payload.len() + 3);
    message.extend_from_slice(&[1, 0, 1]);

    encode_shortvec(2, &mut message);
    message.extend_from_slice(payer.as_bytes());
    message.extend_from_slice(memo_program.as_bytes());

    message.extend_from_slice(recent_blockhash);

    encode_shortvec(1, &mut message);
    message.push(1);
    encode_shortvec(1, &mut message);
    message.push(0);
    encode_shortvec(payload_len, &mut message);
    message.extend_from_slice(payload);

    Some(message)
}

/// Build and sign a memo transaction with `identity` as the fee payer.
pub fn sign_memo_transaction(
    identity: &SigningIdentity,
    memo_program: &Address,
    recent_blockhash: &[u8; 32],
    payload: &[u8],
) -> Option<SignedTransaction> {
    let message = memo_message(
        &identity.public_identity(),
        memo_program,
        recent_blockhash,
        payload,
    )?;
    let signature = identity.sign(&message);

    let mut bytes = Vec::with_capacity(1 + 64 + message.len());
    encode_shortvec(1, &mut bytes);
    bytes.extend_from_slice(&signature);
    bytes.extend_from_slice(&message);

    Some(SignedTransaction { signature, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shortvec(len: u16) -> Vec<u8> {
        let mut out = Vec::new();
        encode_shortvec(len, &mut out);
        out
    }

    #[test]
    fn shortvec_boundaries() {
        assert_eq!(shortvec(0), vec![0x00]);
        assert_eq!(shortvec(0x7f), vec![0x7f]);
        assert_eq!(shortvec(0x80), vec![0x80, 0x01]);
        assert_eq!(shortvec(0x3fff), vec![0xff, 0x7f]);
        assert_eq!(shortvec(0x4000), vec![0x80, 0x80, 0x01]);
        assert_eq!(shortvec(u16::MAX), vec![0xff, 0xff, 0x03]);
    }

    #[test]
    fn message_layout() {
        let identity = SigningIdentity::generate();
        let program = Address::memo_program();
        let blockhash = [7u8; 32];
        let payload = b"hello ledger";

        let message = memo_message(&identity.public_identity(), &program, &blockhash, payload)
            .expect("payload fits");

        assert_eq!(&message[..3], &[1, 0, 1]);
        assert_eq!(message[3], 2);
        assert_eq!(&message[4..36], identity.public_identity().as_bytes());
        assert_eq!(&message[36..68], program.as_bytes());
        assert_eq!(&message[68..100], &blockhash);
        assert_eq!(&message[100..104], &[1, 1, 1, 0]);
        assert_eq!(message[104] as usize, payload.len());
        assert_eq!(&message[105..], payload);
    }

    #[test]
    fn signature_covers_message() {
        let identity = SigningIdentity::generate();
        let program = Address::memo_program();
        let blockhash = [9u8; 32];
        let tx = sign_memo_transaction(&identity, &program, &blockhash, b"memo").expect("fits");

        assert_eq!(tx.bytes[0], 1);
        assert_eq!(&tx.bytes[1..65], &tx.signature);
        assert!(identity.verify(&tx.bytes[65..], &tx.signature));

        let decoded = bs58::decode(tx.reference().as_str()).into_vec().expect("base58");
        assert_eq!(decoded, tx.signature.to_vec());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let identity = SigningIdentity::generate();
        let payload = vec![b'a'; u16::MAX as usize + 1];
        assert!(sign_memo_transaction(&identity, &Address::memo_program(), &[0; 32], &payload)
            .is_none());
    }
}
