//! The 3-D rank topology and its derived communication groups.

use crate::error::CompileError;

/// One rank's coordinate in the (dp, pp, tp) grid plus its linear id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankInfo {
    pub id: usize,
    pub dp: usize,
    pub pp: usize,
    pub tp: usize,
}

/// Degrees of the three parallelism axes.
///
/// The linear id layout is `(dp * pp_degree + pp) * tp_degree + tp`: ranks
/// sharing a tensor-parallel group form a contiguous block of `tp_degree`
/// ids, and data-parallel peers sit `pp_degree * tp_degree` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankTopology {
    dp_degree: usize,
    tp_degree: usize,
    pp_degree: usize,
}

impl RankTopology {
    pub fn new(dp_degree: usize, tp_degree: usize, pp_degree: usize) -> Result<Self, CompileError> {
        if dp_degree < 1 {
            return Err(CompileError::DegreeTooSmall { name: "dp" });
        }
        if tp_degree < 1 {
            return Err(CompileError::DegreeTooSmall { name: "tp" });
        }
        if pp_degree < 1 {
            return Err(CompileError::DegreeTooSmall { name: "pp" });
        }
        Ok(Self {
            dp_degree,
            tp_degree,
            pp_degree,
        })
    }

    pub fn dp_degree(&self) -> usize {
        self.dp_degree
    }

    pub fn tp_degree(&self) -> usize {
        self.tp_degree
    }

    pub fn pp_degree(&self) -> usize {
        self.pp_degree
    }

    pub fn host_count(&self) -> usize {
        self.dp_degree * self.tp_degree * self.pp_degree
    }

    pub fn rank_for(&self, dp: usize, pp: usize, tp: usize) -> usize {
        (dp * self.pp_degree + pp) * self.tp_degree + tp
    }

    /// Every rank in the fixed nested enumeration order dp, then pp, then tp.
    pub fn ranks(&self) -> Vec<RankInfo> {
        let mut ranks = Vec::with_capacity(self.host_count());
        for dp in 0..self.dp_degree {
            for pp in 0..self.pp_degree {
                for tp in 0..self.tp_degree {
                    ranks.push(RankInfo {
                        id: self.rank_for(dp, pp, tp),
                        dp,
                        pp,
                        tp,
                    });
                }
            }
        }
        ranks
    }

    /// Tensor-parallel peers: all ranks sharing (dp, pp), ascending tp.
    pub fn tp_group(&self, rank: &RankInfo) -> Vec<usize> {
        (0..self.tp_degree)
            .map(|tp| self.rank_for(rank.dp, rank.pp, tp))
            .collect()
    }

    /// Data-parallel peers: all ranks sharing (pp, tp), ascending dp.
    pub fn dp_group(&self, rank: &RankInfo) -> Vec<usize> {
        (0..self.dp_degree)
            .map(|dp| self.rank_for(dp, rank.pp, rank.tp))
            .collect()
    }

    /// The rank one pipeline stage earlier, if any.
    pub fn pp_prev(&self, rank: &RankInfo) -> Option<usize> {
        if rank.pp > 0 {
            Some(self.rank_for(rank.dp, rank.pp - 1, rank.tp))
        } else {
            None
        }
    }

    /// The rank one pipeline stage later, if any.
    pub fn pp_next(&self, rank: &RankInfo) -> Option<usize> {
        if rank.pp + 1 < self.pp_degree {
            Some(self.rank_for(rank.dp, rank.pp + 1, rank.tp))
        } else {
            None
        }
    }
}
