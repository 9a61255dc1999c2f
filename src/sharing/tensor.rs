use super::*;

/// One party's view of a secret-shared tensor.
///
/// Every element carries the party's value share and its MAC share, both in
/// the storage ring: summed over all parties, the MAC shares equal alpha times
/// the value, where alpha is the (shared) global MAC key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct PartyTensor<R: ShareRing> {
    id: TensorId,
    party: usize,
    shape: Vec<usize>,
    values: Vec<R::Storage>,
    macs: Vec<R::Storage>,
}

impl<R: ShareRing> PartyTensor<R> {
    pub fn new(
        id: TensorId,
        party: usize,
        shape: Vec<usize>,
        values: Vec<R::Storage>,
        macs: Vec<R::Storage>,
    ) -> Result<Self> {
        let len: usize = shape.iter().product();
        if values.len() != len || macs.len() != len {
            return Err(Error::ShapeMismatch {
                expected: shape,
                got: vec![values.len(), macs.len()],
            });
        }
        Ok(PartyTensor {
            id,
            party,
            shape,
            values,
            macs,
        })
    }

    pub fn from_auths(
        id: TensorId,
        party: usize,
        shape: Vec<usize>,
        auths: Vec<Auth<R>>,
    ) -> Result<Self> {
        let (values, macs) = auths.into_iter().map(|a| (a.value, a.mac)).unzip();
        Self::new(id, party, shape, values, macs)
    }

    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn party(&self) -> usize {
        self.party
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape[..]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[R::Storage] {
        &self.values[..]
    }

    pub fn macs(&self) -> &[R::Storage] {
        &self.macs[..]
    }

    /// Tagged share of the i'th element, reduced into Z / 2^W Z.
    pub fn share(&self, element: usize) -> Share<R> {
        Share {
            id: ValueId {
                tensor: self.id,
                element,
            },
            party: self.party,
            value: R::project(self.values[element]),
        }
    }

    pub fn shares(&self) -> impl Iterator<Item = Share<R>> + '_ {
        (0..self.len()).map(move |i| self.share(i))
    }

    /// Authenticated share of the i'th element.
    pub fn auth(&self, element: usize) -> Auth<R> {
        Auth {
            value: self.values[element],
            mac: self.macs[element],
        }
    }

    pub fn auths(&self) -> Vec<Auth<R>> {
        (0..self.len()).map(|i| self.auth(i)).collect()
    }

    pub fn check_shape(&self, other: &Self) -> Result<()> {
        if self.shape != other.shape {
            return Err(Error::ShapeMismatch {
                expected: self.shape.clone(),
                got: other.shape.clone(),
            });
        }
        Ok(())
    }

    /// Reduce every share into the storage ring of a narrower ring.
    ///
    /// Since 2^W' divides 2^W, the reduced shares still sum to the value
    /// (mod 2^W') and the MAC relation holds under alpha reduced the same way.
    pub fn narrow<D: ShareRing>(&self) -> Result<PartyTensor<D>> {
        if D::BITS > R::BITS || D::Storage::BITS > R::Storage::BITS {
            return Err(Error::Configuration(format!(
                "cannot narrow a {}-bit tensor to {} bits",
                R::BITS,
                D::BITS
            )));
        }
        let reduce = |x: &R::Storage| D::Storage::from_u128(x.as_u128());
        Ok(PartyTensor {
            id: self.id,
            party: self.party,
            shape: self.shape.clone(),
            values: self.values.iter().map(reduce).collect(),
            macs: self.macs.iter().map(reduce).collect(),
        })
    }
}

/// The joint view of a shared tensor: the party tensors of all N parties.
///
/// Only the dealer (or a test harness) ever holds one of these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedTensor<R: ShareRing> {
    id: TensorId,
    shape: Vec<usize>,
    parts: Vec<PartyTensor<R>>,
}

impl<R: ShareRing> SharedTensor<R> {
    pub fn new(parts: Vec<PartyTensor<R>>) -> Result<Self> {
        let first = parts.first().ok_or(Error::IncompleteShareSet {
            expected: 1,
            got: 0,
        })?;
        let id = first.id;
        let shape = first.shape.clone();
        for (party, part) in parts.iter().enumerate() {
            first.check_shape(part)?;
            if part.party != party || part.id != id {
                return Err(Error::IncompleteShareSet {
                    expected: parts.len(),
                    got: party,
                });
            }
        }
        Ok(SharedTensor { id, shape, parts })
    }

    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape[..]
    }

    pub fn parties(&self) -> usize {
        self.parts.len()
    }

    pub fn part(&self, party: usize) -> &PartyTensor<R> {
        &self.parts[party]
    }

    pub fn into_parts(self) -> Vec<PartyTensor<R>> {
        self.parts
    }

    pub fn reconstruct(&self) -> Result<Vec<R>> {
        let parts: Vec<&PartyTensor<R>> = self.parts.iter().collect();
        reconstruct_tensor(&parts[..], self.parties())
    }

    /// Check the MAC relation of every element under the global key.
    pub fn macs_hold(&self, key: R::Storage) -> bool {
        let zero = <R::Storage as RingElement>::ZERO;
        (0..self.shape.iter().product::<usize>()).all(|i| {
            let value = self.parts.iter().map(|p| p.values[i]).fold(zero, |a, b| a + b);
            let mac = self.parts.iter().map(|p| p.macs[i]).fold(zero, |a, b| a + b);
            mac == key * value
        })
    }
}

/// Recombine a tensor from the views of (what should be) all parties.
pub fn reconstruct_tensor<R: ShareRing>(
    parts: &[&PartyTensor<R>],
    parties: usize,
) -> Result<Vec<R>> {
    let first = match parts.first() {
        Some(first) if parts.len() >= parties => first,
        _ => {
            return Err(Error::IncompleteShareSet {
                expected: parties,
                got: parts.len(),
            })
        }
    };
    for part in parts.iter() {
        first.check_shape(part)?;
    }

    let mut values = Vec::with_capacity(first.len());
    let mut shares = Vec::with_capacity(parts.len());
    for i in 0..first.len() {
        shares.clear();
        shares.extend(parts.iter().map(|p| p.share(i)));
        values.push(reconstruct(&shares[..], parties)?);
    }
    Ok(values)
}
